use crate::commands::{build_context, now_unix};
use crate::config::Config;
use crate::store::model::GrafanaInstance;
use anyhow::Result;
use colored::Colorize;

#[allow(clippy::too_many_arguments)]
pub fn run(
    config: &Config,
    query_id: &str,
    instance_id: &str,
    instance_base_url: Option<&str>,
    metric_query: &str,
    labels: &str,
    start: i64,
    end: i64,
) -> Result<()> {
    let ctx = build_context(config)?;

    if let Some(base_url) = instance_base_url {
        ctx.store.upsert_instance(&GrafanaInstance {
            instance_id: instance_id.to_string(),
            base_url: base_url.to_string(),
            datasource_id: instance_id.to_string(),
        })?;
    }

    let outcome = ctx.manager.recalculate_stats(query_id, instance_id, metric_query, labels, start, end, now_unix())?;

    println!(
        "{} rebuilt={} coefficients={} bounds={}",
        "ok:".green().bold(),
        outcome.rebuilt,
        outcome.model.shape.coefficients.len(),
        outcome.model.bounds.len()
    );
    println!("{}", serde_json::to_string_pretty(&outcome.model)?);
    Ok(())
}
