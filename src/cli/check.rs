use anyhow::Result;
use clap::Args;
use route_gate::GateRouter;
use serde::Serialize;

use crate::app::build_gate;
use crate::config::WardenConfig;

#[derive(Args, Clone, Debug)]
pub struct CheckConfigArgs {
    /// Print the compiled route table as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct RouteSummary {
    pub method: String,
    pub path: String,
    pub plugin: Option<String>,
    pub permissions: Vec<String>,
    pub stages: Vec<String>,
}

pub fn summarize(gate: &GateRouter) -> Vec<RouteSummary> {
    let mut routes: Vec<RouteSummary> = gate
        .pipelines()
        .map(|pipeline| {
            let policy = pipeline.policy();
            RouteSummary {
                method: policy.method().to_string(),
                path: policy.path().to_string(),
                plugin: policy.auth().map(|auth| auth.plugin_kind.clone()),
                permissions: policy
                    .accepted_permissions()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                stages: pipeline
                    .stage_kinds()
                    .iter()
                    .map(|kind| kind.as_str().to_string())
                    .collect(),
            }
        })
        .collect();
    routes.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.method.cmp(&b.method)));
    routes
}

pub async fn cmd_check_config(args: CheckConfigArgs, config: &WardenConfig) -> Result<()> {
    let gate = build_gate(config).await?;
    let routes = summarize(&gate);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&routes)?);
        return Ok(());
    }

    println!("{} route(s) compiled", routes.len());
    for route in &routes {
        let stages = if route.stages.is_empty() {
            "-".to_string()
        } else {
            route.stages.join(" -> ")
        };
        println!("  {:<7} {:<28} {}", route.method, route.path, stages);
        if !route.permissions.is_empty() {
            println!("          permissions: {}", route.permissions.join(", "));
        }
    }
    Ok(())
}
