//! Executes the agent's commands against the live page.

use crate::dom::{self, ID_ATTRIBUTE, LAZY_ATTRIBUTES};
use crate::fetch;
use imgshift_agent::{
    AgentConfig, Command, ElementId, ImageSnapshot, RecoveryAgent, INTERSECTION_ROOT_MARGIN_PX,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{
    AddEventListenerOptions, Document, HtmlImageElement, IntersectionObserver,
    IntersectionObserverEntry, IntersectionObserverInit, MutationObserver, MutationObserverInit,
    MutationRecord, Window,
};

/// One page's agent plus the DOM objects its element ids refer to.
///
/// Event callbacks are registered for the page's lifetime and hold the host alive.
pub struct Host {
    window: Window,
    document: Document,
    agent: RefCell<RecoveryAgent>,
    images: RefCell<HashMap<ElementId, HtmlImageElement>>,
    next_id: Cell<ElementId>,
    intersection: RefCell<Option<IntersectionObserver>>,
    mutation: RefCell<Option<MutationObserver>>,
    tick: RefCell<Option<Closure<dyn FnMut()>>>,
    rescan_timer: Cell<Option<i32>>,
}

impl Host {
    pub fn install(
        window: Window,
        document: Document,
        config: AgentConfig,
    ) -> Result<Rc<Self>, JsValue> {
        let intersection_supported = config.intersection_supported;
        let host = Rc::new(Host {
            window,
            document,
            agent: RefCell::new(RecoveryAgent::new(config)),
            images: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            intersection: RefCell::new(None),
            mutation: RefCell::new(None),
            tick: RefCell::new(None),
            rescan_timer: Cell::new(None),
        });

        if intersection_supported {
            let observer = host.intersection_observer()?;
            *host.intersection.borrow_mut() = Some(observer);
        }
        host.install_tick();
        host.watch_mutations()?;
        host.listen_for_navigation()?;
        host.rescan();
        Ok(host)
    }

    fn now(&self) -> Duration {
        let millis = self
            .window
            .performance()
            .map(|performance| performance.now())
            .unwrap_or_default();
        dom::page_clock(millis)
    }

    fn image(&self, element: ElementId) -> Option<HtmlImageElement> {
        self.images.borrow().get(&element).cloned()
    }

    /// Id of an element this host registered. Clones carrying a copied id attribute
    /// are not the same element and get their own id.
    fn known_id(&self, img: &HtmlImageElement) -> Option<ElementId> {
        let id = dom::parse_element_id(img.get_attribute(ID_ATTRIBUTE).as_deref())?;
        let same_element = self.images.borrow().get(&id).is_some_and(|known| known == img);
        same_element.then_some(id)
    }

    fn identify(&self, img: &HtmlImageElement) -> ElementId {
        if let Some(id) = self.known_id(img) {
            return id;
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let _ = img.set_attribute(ID_ATTRIBUTE, &id.to_string());
        self.images.borrow_mut().insert(id, img.clone());
        id
    }

    fn collect(&self) -> Vec<ImageSnapshot> {
        let Ok(nodes) = self.document.query_selector_all("img") else {
            return Vec::new();
        };
        let mut snapshots = Vec::with_capacity(nodes.length() as usize);
        for index in 0..nodes.length() {
            let Some(img) = nodes
                .item(index)
                .and_then(|node| node.dyn_into::<HtmlImageElement>().ok())
            else {
                continue;
            };
            let id = self.identify(&img);
            snapshots.push(dom::snapshot(id, &img));
        }
        snapshots
    }

    fn rescan(self: &Rc<Self>) {
        let snapshots = self.collect();
        let commands = self.agent.borrow_mut().scan(&snapshots);
        self.execute(commands);
    }

    fn execute(self: &Rc<Self>, commands: Vec<Command>) {
        for command in commands {
            if let Err(err) = self.apply(command) {
                web_sys::console::warn_2(&JsValue::from_str("imgshift: command failed"), &err);
            }
        }
    }

    fn apply(self: &Rc<Self>, command: Command) -> Result<(), JsValue> {
        match command {
            Command::ListenForError { element } => {
                let Some(img) = self.image(element) else {
                    return Ok(());
                };
                let host = Rc::clone(self);
                let on_error = Closure::once_into_js(move || {
                    let commands = host.agent.borrow_mut().on_error(element);
                    host.execute(commands);
                });
                let options = AddEventListenerOptions::new();
                options.set_once(true);
                img.add_event_listener_with_callback_and_add_event_listener_options(
                    "error",
                    on_error.unchecked_ref(),
                    &options,
                )?;
            }
            Command::RecordOriginalSrc { element, url } => {
                if let Some(img) = self.image(element) {
                    img.set_attribute("data-original-src", &url)?;
                }
            }
            Command::Observe { element } => {
                if let (Some(observer), Some(img)) =
                    (self.intersection.borrow().as_ref(), self.image(element))
                {
                    observer.observe(&img);
                }
            }
            Command::Unobserve { element } => {
                if let (Some(observer), Some(img)) =
                    (self.intersection.borrow().as_ref(), self.image(element))
                {
                    observer.unobserve(&img);
                }
            }
            Command::TrialLoad { element, url } => {
                let trial = HtmlImageElement::new()?;
                trial.set_onload(Some(self.trial_callback(element, true).unchecked_ref()));
                trial.set_onerror(Some(self.trial_callback(element, false).unchecked_ref()));
                trial.set_src(&url);
            }
            Command::SetSrc { element, url } => {
                if let Some(img) = self.image(element) {
                    img.set_src(&url);
                }
            }
            Command::ClearLazyAttributes { element } => {
                if let Some(img) = self.image(element) {
                    for attribute in LAZY_ATTRIBUTES {
                        img.remove_attribute(attribute)?;
                    }
                }
            }
            Command::RequestFallback {
                element,
                image_url,
                csrf_token,
            } => {
                let host = Rc::clone(self);
                spawn_local(async move {
                    let reply = fetch::fetch_fallback(&host.window, &image_url, &csrf_token).await;
                    let commands = host.agent.borrow_mut().on_fallback_reply(element, reply);
                    host.execute(commands);
                });
            }
            Command::ScheduleRescan { at } => {
                self.cancel_rescan();
                let tick = self.tick.borrow();
                if let Some(tick) = tick.as_ref() {
                    let handle = self
                        .window
                        .set_timeout_with_callback_and_timeout_and_arguments_0(
                            tick.as_ref().unchecked_ref(),
                            dom::timer_delay_ms(at, self.now()),
                        )?;
                    self.rescan_timer.set(Some(handle));
                }
            }
            Command::CancelRescan => self.cancel_rescan(),
            Command::Rescan => self.rescan(),
            Command::DisconnectObservers => {
                if let Some(observer) = self.intersection.borrow_mut().take() {
                    observer.disconnect();
                }
                if let Some(observer) = self.mutation.borrow_mut().take() {
                    observer.disconnect();
                }
            }
        }
        Ok(())
    }

    fn trial_callback(self: &Rc<Self>, element: ElementId, loaded: bool) -> JsValue {
        let host = Rc::clone(self);
        Closure::once_into_js(move || {
            let commands = host.agent.borrow_mut().on_trial_load(element, loaded);
            host.execute(commands);
        })
    }

    fn cancel_rescan(&self) {
        if let Some(handle) = self.rescan_timer.take() {
            self.window.clear_timeout_with_handle(handle);
        }
    }

    fn install_tick(self: &Rc<Self>) {
        let host = Rc::clone(self);
        let tick = Closure::<dyn FnMut()>::new(move || {
            host.rescan_timer.set(None);
            let now = host.now();
            let commands = host.agent.borrow_mut().poll(now);
            host.execute(commands);
        });
        *self.tick.borrow_mut() = Some(tick);
    }

    fn intersection_observer(self: &Rc<Self>) -> Result<IntersectionObserver, JsValue> {
        let host = Rc::clone(self);
        let callback = Closure::<dyn FnMut(js_sys::Array)>::new(move |entries: js_sys::Array| {
            for entry in entries.iter() {
                let Ok(entry) = entry.dyn_into::<IntersectionObserverEntry>() else {
                    continue;
                };
                if !entry.is_intersecting() {
                    continue;
                }
                let Ok(img) = entry.target().dyn_into::<HtmlImageElement>() else {
                    continue;
                };
                let Some(id) = host.known_id(&img) else {
                    continue;
                };
                let snapshot = dom::snapshot(id, &img);
                let commands = host.agent.borrow_mut().on_intersect(&snapshot);
                host.execute(commands);
            }
        });

        let options = IntersectionObserverInit::new();
        options.set_root_margin(&format!("{}px", INTERSECTION_ROOT_MARGIN_PX));
        let observer =
            IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &options)?;
        callback.forget();
        Ok(observer)
    }

    fn watch_mutations(self: &Rc<Self>) -> Result<(), JsValue> {
        let Some(body) = self.document.body() else {
            return Ok(());
        };
        let host = Rc::clone(self);
        let callback = Closure::<dyn FnMut(js_sys::Array)>::new(move |records: js_sys::Array| {
            let inserted = records
                .iter()
                .filter_map(|record| record.dyn_into::<MutationRecord>().ok())
                .any(|record| record.added_nodes().length() > 0);
            if inserted {
                let now = host.now();
                let commands = host.agent.borrow_mut().on_mutation(now);
                host.execute(commands);
            }
        });

        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        observer.observe_with_options(&body, &options)?;
        callback.forget();
        *self.mutation.borrow_mut() = Some(observer);
        Ok(())
    }

    fn listen_for_navigation(self: &Rc<Self>) -> Result<(), JsValue> {
        let host = Rc::clone(self);
        let on_pagehide = Closure::once_into_js(move || {
            let commands = host.agent.borrow_mut().teardown();
            host.execute(commands);
        });
        let options = AddEventListenerOptions::new();
        options.set_once(true);
        self.window
            .add_event_listener_with_callback_and_add_event_listener_options(
                "pagehide",
                on_pagehide.unchecked_ref(),
                &options,
            )
    }
}
