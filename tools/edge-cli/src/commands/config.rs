//! Configuration inspection commands.

use anyhow::{bail, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::config::generate_default_config;
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Validate => validate_config(ctx),
        ConfigCommand::Example => {
            print!("{}", generate_default_config());
            Ok(())
        }
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(none, using defaults)"),
    }

    let prerender = &ctx.config.prerender;
    let settings = prerender.settings();

    ctx.output.info("");
    ctx.output.info("[prerender]");
    ctx.output.kv("tier", &prerender.tier.to_string());
    ctx.output.kv(
        "concurrency",
        &format!(
            "{} (tier maximum {})",
            settings.limits.concurrency,
            prerender.tier.limits().concurrency
        ),
    );
    ctx.output
        .kv("total_request_cap", &settings.limits.total_request_cap.to_string());
    ctx.output.kv("timeout_secs", &prerender.timeout_secs.to_string());
    ctx.output.kv("cancel_policy", &prerender.cancel_policy.to_string());
    ctx.output.kv("max_retries", &prerender.max_retries.to_string());
    if let Some(ref name) = prerender.paths_env {
        ctx.output.kv("paths_env", name);
    }
    if let Some(ref origin) = prerender.origin {
        ctx.output.kv("origin", origin);
    }
    ctx.output.kv(
        "cache_dir",
        &ctx.cache_dir(prerender.cache_dir.as_deref()).display().to_string(),
    );

    for route in &ctx.config.routes {
        ctx.output.info("");
        ctx.output.info("[[routes]]");
        ctx.output.kv("pattern", &route.pattern);
        ctx.output.kv("paths", &route.paths.len().to_string());
        if route.cache.enabled {
            ctx.output
                .kv("cache-control", &route.cache.edge.cache_control_header());
        } else {
            ctx.output.kv("cache", "disabled");
        }
        if !route.cache.key.is_path_only() {
            let components: Vec<String> = route
                .cache
                .key
                .components()
                .iter()
                .map(ToString::to_string)
                .collect();
            ctx.output.kv("key", &components.join(", "));
        }
    }

    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Validating configuration");

    if ctx.config_path.is_none() {
        ctx.output.warn("No config file found; validating defaults");
    }

    let (errors, warnings) = ctx.config.validate();

    if errors.is_empty() && warnings.is_empty() {
        ctx.output.success("Configuration is valid");
        return Ok(());
    }

    for error in &errors {
        ctx.output.error(&format!("Error: {}", error));
    }

    for warning in &warnings {
        ctx.output.warn(&format!("Warning: {}", warning));
    }

    if !errors.is_empty() {
        bail!("Configuration has {} error(s)", errors.len());
    }

    ctx.output.success("Configuration is valid (with warnings)");

    Ok(())
}
