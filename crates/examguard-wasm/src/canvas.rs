//! Canvas painting for watermarked questions.

use examguard_core::{RasterPlan, TextMeasure, WatermarkId, WatermarkedRenderer};
use rand::SeedableRng;
use rand::rngs::StdRng;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use crate::{crypto_get_random, performance_now};

/// Measures with the context's current font.
struct CanvasMeasure<'a> {
    ctx: &'a CanvasRenderingContext2d,
}

impl TextMeasure for CanvasMeasure<'_> {
    fn width(&self, text: &str) -> f64 {
        self.ctx
            .measure_text(text)
            .map(|m| m.width())
            .unwrap_or_default()
    }
}

/// RNG for noise placement, seeded from `crypto.getRandomValues()`.
pub(crate) fn seeded_rng() -> StdRng {
    let mut seed = [0u8; 8];
    if !crypto_get_random(&mut seed) {
        seed = performance_now().to_bits().to_le_bytes();
    }
    StdRng::seed_from_u64(u64::from_le_bytes(seed))
}

fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d, JsValue> {
    canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| JsValue::from_str("not a 2d context"))
}

fn paint(ctx: &CanvasRenderingContext2d, plan: &RasterPlan) -> Result<(), JsValue> {
    ctx.clear_rect(0.0, 0.0, plan.width, plan.height);
    ctx.set_text_baseline("top");

    ctx.set_font(&plan.text_font);
    ctx.set_fill_style_str(&plan.text_fill);
    for line in &plan.lines {
        ctx.fill_text(&line.text, line.x, line.y)?;
    }

    ctx.set_font(&plan.noise_font);
    ctx.set_fill_style_str(&plan.noise_fill);
    for stamp in &plan.noise {
        ctx.fill_text(&stamp.text, stamp.x, stamp.y)?;
    }
    Ok(())
}

/// Paint `text` into `canvas` as pixels, stamped with `watermark_id`.
///
/// The backing store is sized to the element's layout box times the device
/// pixel ratio, so text stays sharp on high-density displays.
#[wasm_bindgen(js_name = paintSecureQuestion)]
pub fn paint_secure_question(
    canvas: &HtmlCanvasElement,
    text: &str,
    watermark_id: &str,
) -> Result<(), JsValue> {
    let dpr = web_sys::window()
        .map(|w| w.device_pixel_ratio())
        .unwrap_or(1.0);
    let rect = canvas.get_bounding_client_rect();
    canvas.set_width((rect.width() * dpr) as u32);
    canvas.set_height((rect.height() * dpr) as u32);

    let ctx = context_2d(canvas)?;
    ctx.scale(dpr, dpr)?;

    let renderer = WatermarkedRenderer::default();
    ctx.set_font(&renderer.style().text_font);
    let plan = renderer.plan(
        text,
        &WatermarkId::new(watermark_id),
        rect.width(),
        rect.height(),
        &CanvasMeasure { ctx: &ctx },
        &mut seeded_rng(),
    );
    paint(&ctx, &plan)
}
