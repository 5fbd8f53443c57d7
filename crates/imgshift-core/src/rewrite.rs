//! Domain rewrite rules
//!
//! A [`DomainRewriteRule`] is plain configuration: literal old domains, prefix tokens
//! combined with a fixed CDN suffix, and the new domain. Compiling it yields a
//! [`DomainRewriter`] holding a single case-insensitive alternation that is applied to
//! HTML text and, recursively, to every string of a JSON document.

use regex::{Captures, Regex};
use serde_json::Value;
use std::borrow::Cow;

/// Configuration for rewriting image URLs from retired hosts to the current domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainRewriteRule {
    /// Replacement domain, with or without scheme (`storage.example.com/bucket`).
    pub new_domain: String,
    /// Literal old domains (`old.cdn`, `images.example.org`).
    pub old_domains: Vec<String>,
    /// Prefix tokens such as `resize`, `cdn`, `storage`.
    pub prefix_tokens: Vec<String>,
    /// Suffix domain the prefix tokens live under.
    pub cdn_suffix: String,
}

impl DomainRewriteRule {
    /// Split a comma-separated configuration list, dropping blanks.
    pub fn parse_list(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// A rule with no new domain or no patterns rewrites nothing.
    pub fn is_active(&self) -> bool {
        !self.new_domain.trim().is_empty()
            && (!self.old_domains.is_empty() || !self.prefix_tokens.is_empty())
    }

    /// Matching pattern: `https?://(<alternatives>)[^"'\s]*`, case-insensitive.
    pub fn pattern(&self) -> Option<String> {
        let mut alternatives: Vec<String> = self
            .old_domains
            .iter()
            .map(|domain| regex::escape(strip_scheme(domain)))
            .collect();

        let suffix = regex::escape(&self.cdn_suffix);
        for prefix in &self.prefix_tokens {
            let prefix = regex::escape(prefix);
            if !suffix.is_empty() {
                alternatives.push(format!(r"(?:{}\.)?{}", prefix, suffix));
            }
            alternatives.push(format!(r#"{}[^"'\s]*"#, prefix));
        }

        if alternatives.is_empty() {
            return None;
        }
        Some(format!(r#"(?i)https?://(?:{})[^"'\s]*"#, alternatives.join("|")))
    }

    /// Compile the rule. Returns `None` when there is nothing to rewrite.
    pub fn compile(&self) -> Result<Option<DomainRewriter>, regex::Error> {
        if !self.is_active() {
            return Ok(None);
        }
        let Some(pattern) = self.pattern() else {
            return Ok(None);
        };

        let url_pattern = Regex::new(&pattern)?;
        let old_domain_pattern = if self.old_domains.is_empty() {
            None
        } else {
            // Longest first so `img.old.cdn` wins over `old.cdn`.
            let mut domains = self.old_domains.clone();
            domains.sort_by_key(|d| std::cmp::Reverse(d.len()));
            let alternation = domains
                .iter()
                .map(|d| regex::escape(strip_scheme(d)))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&format!(
                "(?i)(?:[a-z][a-z0-9+.-]*://)?(?:{})",
                alternation
            ))?)
        };

        let new_domain = self.new_domain.trim().trim_end_matches('/').to_string();
        let new_host = strip_scheme(&new_domain).to_string();

        Ok(Some(DomainRewriter {
            url_pattern,
            old_domain_pattern,
            new_domain,
            new_host,
            cdn_suffix: self.cdn_suffix.to_ascii_lowercase(),
        }))
    }
}

/// Compiled form of a [`DomainRewriteRule`].
#[derive(Debug, Clone)]
pub struct DomainRewriter {
    url_pattern: Regex,
    old_domain_pattern: Option<Regex>,
    new_domain: String,
    new_host: String,
    cdn_suffix: String,
}

impl DomainRewriter {
    pub fn new_domain(&self) -> &str {
        &self.new_domain
    }

    /// Rewrite every matching URL in `text`.
    pub fn rewrite_text<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.rewrite_text_with(text, |_| {})
    }

    /// Rewrite every matching URL in `text`, reporting each URL that changed.
    pub fn rewrite_text_with<'t>(
        &self,
        text: &'t str,
        mut on_rewrite: impl FnMut(&str),
    ) -> Cow<'t, str> {
        self.url_pattern.replace_all(text, |caps: &Captures<'_>| {
            let matched = &caps[0];
            match self.rewrite_url(matched) {
                Some(rewritten) => {
                    on_rewrite(&rewritten);
                    rewritten
                }
                None => matched.to_string(),
            }
        })
    }

    /// Rewrite a JSON document in place, descending into arrays and objects.
    ///
    /// Returns the number of string values that changed.
    pub fn rewrite_json(&self, value: &mut Value, on_rewrite: &mut dyn FnMut(&str)) -> usize {
        match value {
            Value::String(s) => {
                let rewritten = self.rewrite_text_with(s, &mut *on_rewrite);
                if let Cow::Owned(new) = rewritten {
                    if new != *s {
                        *s = new;
                        return 1;
                    }
                }
                0
            }
            Value::Array(items) => items
                .iter_mut()
                .map(|item| self.rewrite_json(item, on_rewrite))
                .sum(),
            Value::Object(map) => map
                .values_mut()
                .map(|item| self.rewrite_json(item, on_rewrite))
                .sum(),
            _ => 0,
        }
    }

    /// Rewrite one matched URL. Returns `None` when the URL is left untouched.
    pub fn rewrite_url(&self, url: &str) -> Option<String> {
        let rest = strip_scheme(url);
        if starts_with_ignore_case(rest, &self.new_host) {
            return None;
        }

        let replaced = match &self.old_domain_pattern {
            Some(pattern) if pattern.is_match(url) => pattern
                .replace_all(url, |caps: &Captures<'_>| {
                    let matched = &caps[0];
                    match matched.find("://") {
                        Some(idx) => self.with_scheme(&matched[..idx + 3]),
                        None => self.new_host.clone(),
                    }
                })
                .into_owned(),
            _ => self.replace_cdn_host(url)?,
        };

        let collapsed = self.collapse_duplicate_domain(replaced);
        (collapsed != url).then_some(collapsed)
    }

    /// Replace the host of a URL on the CDN suffix family with the new domain.
    fn replace_cdn_host(&self, url: &str) -> Option<String> {
        let scheme_end = url.find("://")? + 3;
        let rest = &url[scheme_end..];
        let host_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let host = rest[..host_end].to_ascii_lowercase();
        if self.cdn_suffix.is_empty()
            || !(host == self.cdn_suffix || host.ends_with(&format!(".{}", self.cdn_suffix)))
        {
            return None;
        }
        Some(format!(
            "{}{}",
            self.with_scheme(&url[..scheme_end]),
            &rest[host_end..]
        ))
    }

    /// The new domain prefixed by its own scheme, or by `scheme` when it has none.
    fn with_scheme(&self, scheme: &str) -> String {
        if self.new_domain.contains("://") {
            self.new_domain.clone()
        } else {
            format!("{}{}", scheme, self.new_host)
        }
    }

    fn collapse_duplicate_domain(&self, mut url: String) -> String {
        if self.new_host.is_empty() {
            return url;
        }
        let doubled = format!("{0}/{0}", self.new_host);
        while url.contains(&doubled) {
            url = url.replacen(&doubled, &self.new_host, 1);
        }
        url
    }
}

/// Insert `<script src="...">` before the last `</body>` (case-insensitive).
///
/// Documents without a closing body tag, or that already load the script, are returned unchanged.
pub fn inject_agent_script<'h>(html: &'h str, script_src: &str) -> Cow<'h, str> {
    if html.contains(&format!("src=\"{}\"", script_src)) {
        return Cow::Borrowed(html);
    }
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(idx) => {
            let tag = format!("<script src=\"{}\"></script>\n", script_src);
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..idx]);
            out.push_str(&tag);
            out.push_str(&html[idx..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(html),
    }
}

/// True for `prefix` itself and anything below `prefix/`.
pub fn is_admin_path(path: &str, prefixes: &[String]) -> bool {
    let path = path.trim_start_matches('/');
    prefixes.iter().any(|prefix| {
        let prefix = prefix.trim_matches('/');
        !prefix.is_empty()
            && path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

fn strip_scheme(url: &str) -> &str {
    match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    }
}

fn starts_with_ignore_case(haystack: &str, needle: &str) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.is_char_boundary(needle.len())
        && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule() -> DomainRewriteRule {
        DomainRewriteRule {
            new_domain: "https://storage.example.com/bucket".to_string(),
            old_domains: vec!["old.cdn".to_string()],
            prefix_tokens: vec!["resize".to_string(), "cdn".to_string()],
            cdn_suffix: "sudospaces.com".to_string(),
        }
    }

    fn rewriter() -> DomainRewriter {
        rule().compile().unwrap().unwrap()
    }

    #[test]
    fn test_rewrites_both_attributes_and_nothing_else() {
        let html = r#"<p>old.cdn rocks</p><img src="http://old.cdn/foo.png"><img data-src="http://old.cdn/bar.png" alt="old.cdn">"#;
        let out = rewriter().rewrite_text(html);
        assert_eq!(
            out,
            r#"<p>old.cdn rocks</p><img src="https://storage.example.com/bucket/foo.png"><img data-src="https://storage.example.com/bucket/bar.png" alt="old.cdn">"#
        );
    }

    #[test]
    fn test_prefix_tokens_rewrite_cdn_hosts_only() {
        let out = rewriter().rewrite_text(
            r#"<img src="https://resize.sudospaces.com/a/w300/x.jpg"><script src="https://cdnjs.cloudflare.com/lib.js"></script>"#,
        );
        assert_eq!(
            out,
            r#"<img src="https://storage.example.com/bucket/a/w300/x.jpg"><script src="https://cdnjs.cloudflare.com/lib.js"></script>"#
        );
    }

    #[test]
    fn test_urls_on_new_domain_are_left_alone() {
        let rule = DomainRewriteRule {
            new_domain: "storage.sudospaces.com/bucket".to_string(),
            old_domains: vec![],
            prefix_tokens: vec!["storage".to_string()],
            cdn_suffix: "sudospaces.com".to_string(),
        };
        let rewriter = rule.compile().unwrap().unwrap();
        let html = r#"<img src="https://storage.sudospaces.com/bucket/2025/a.jpg">"#;
        assert_eq!(rewriter.rewrite_text(html), html);
    }

    #[test]
    fn test_collapses_duplicated_new_domain() {
        let rule = DomainRewriteRule {
            new_domain: "new.example.com".to_string(),
            old_domains: vec!["old.example.com".to_string()],
            ..Default::default()
        };
        let rewriter = rule.compile().unwrap().unwrap();
        assert_eq!(
            rewriter.rewrite_url("https://old.example.com/new.example.com/a.png").as_deref(),
            Some("https://new.example.com/a.png")
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(
            rewriter().rewrite_url("HTTP://OLD.CDN/Foo.PNG").as_deref(),
            Some("https://storage.example.com/bucket/Foo.PNG")
        );
    }

    #[test]
    fn test_rewrite_json_recurses_into_strings() {
        let mut doc = json!({
            "title": "old.cdn",
            "items": [
                {"image": "http://old.cdn/a.jpg"},
                {"html": "<img src='http://old.cdn/b.jpg'>"}
            ],
            "count": 2
        });
        let mut seen = Vec::new();
        let changed = rewriter().rewrite_json(&mut doc, &mut |url: &str| seen.push(url.to_string()));
        assert_eq!(changed, 2);
        assert_eq!(doc["title"], "old.cdn");
        assert_eq!(doc["items"][0]["image"], "https://storage.example.com/bucket/a.jpg");
        assert_eq!(
            doc["items"][1]["html"],
            "<img src='https://storage.example.com/bucket/b.jpg'>"
        );
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_inactive_rules_compile_to_none() {
        assert!(DomainRewriteRule::default().compile().unwrap().is_none());
        let no_domain = DomainRewriteRule {
            old_domains: vec!["old.cdn".into()],
            ..Default::default()
        };
        assert!(no_domain.compile().unwrap().is_none());
    }

    #[test]
    fn test_inject_agent_script_before_last_body() {
        let html = "<html><body><pre></body></pre></BODY></html>";
        let out = inject_agent_script(html, "/agent.js");
        assert_eq!(
            out,
            "<html><body><pre></body></pre><script src=\"/agent.js\"></script>\n</BODY></html>"
        );
        assert_eq!(inject_agent_script(&out, "/agent.js"), out);
        assert_eq!(inject_agent_script("<p>fragment</p>", "/agent.js"), "<p>fragment</p>");
    }

    #[test]
    fn test_is_admin_path() {
        let prefixes = DomainRewriteRule::parse_list("admin, scms");
        assert!(is_admin_path("/admin", &prefixes));
        assert!(is_admin_path("/admin/posts/1", &prefixes));
        assert!(is_admin_path("/scms/media", &prefixes));
        assert!(!is_admin_path("/administrator", &prefixes));
        assert!(!is_admin_path("/blog/admin", &prefixes));
    }
}
