use examguard_core::{
    BaitRenderer, MonospaceMeasure, PoisonMarker, ProctorError, RasterPlan, Result, WatermarkId,
    WatermarkedRenderer,
};

use super::{Context, runtime};
use crate::GlobalArgs;

pub struct RenderCommandConfig<'a> {
    pub question: &'a str,
    pub format: &'a str,
    pub exam_id: &'a str,
    pub question_id: &'a str,
    pub student_id: Option<i64>,
    pub width: f64,
    pub height: f64,
}

pub fn run(global: &GlobalArgs, cfg: RenderCommandConfig<'_>) -> Result<()> {
    match cfg.format {
        "plan" => {
            let student_id = match cfg.student_id {
                Some(id) => id,
                None => {
                    let ctx = Context::new(global)?;
                    runtime()?
                        .block_on(ctx.session.check_session())
                        .ok_or(ProctorError::AuthenticationRejected)?
                        .id
                }
            };
            let plan = raster_plan(&cfg, student_id, &uuid::Uuid::new_v4().to_string());
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        _ => println!("{}", html_fragment(cfg.question)),
    }
    Ok(())
}

/// Bait field and poisoned question, ready to embed in an exam form.
fn html_fragment(question: &str) -> String {
    format!(
        "{}\n{}",
        PoisonMarker::default().poisoned_question_html(question),
        BaitRenderer.render_html()
    )
}

fn raster_plan(cfg: &RenderCommandConfig<'_>, student_id: i64, nonce: &str) -> RasterPlan {
    let id = WatermarkId::derive(student_id, cfg.exam_id, cfg.question_id, nonce);
    log::info!("watermark {id} for principal {student_id}");
    WatermarkedRenderer::default().plan(
        cfg.question,
        &id,
        cfg.width,
        cfg.height,
        &MonospaceMeasure::default(),
        &mut rand::rng(),
    )
}
