//! Test fixtures: encoded images of a given size and stand-in agent build output.

use image::{ImageFormat, Rgb, RgbImage};
use imgshift_api::constants::{AGENT_GLUE_FILE, AGENT_WASM_FILE};
use std::io::Cursor;
use std::path::Path;

pub const AGENT_GLUE: &str = "let wasm_bindgen;";
pub const AGENT_MODULE: &[u8] = b"\0asm\x01\0\0\0";

/// Files `wasm-pack build --target no-modules` leaves for `imgshift-agent-web`.
pub fn write_agent_assets(dir: &Path) {
    std::fs::write(dir.join(AGENT_GLUE_FILE), AGENT_GLUE).expect("Failed to write agent glue");
    std::fs::write(dir.join(AGENT_WASM_FILE), AGENT_MODULE).expect("Failed to write agent module");
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .expect("Failed to encode JPEG fixture");
    buf.into_inner()
}

pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    buf.into_inner()
}
