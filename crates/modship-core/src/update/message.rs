use super::context::UpdateContext;

/// Structured commit message recording a module update in the parent.
pub fn commit_message(prefix: &str, ctx: &UpdateContext) -> String {
    let previous = ctx
        .previous_ref
        .as_ref()
        .map(|r| r.as_str())
        .unwrap_or("unknown");
    let target = ctx
        .target_ref
        .as_ref()
        .map(|r| r.as_str())
        .unwrap_or("unknown");
    let current_version = ctx.current_version.as_deref().unwrap_or("unknown");
    let update_type = ctx.update_type.map(|t| t.as_str()).unwrap_or("unknown");

    let mut message = format!(
        "{prefix}: update {module} to {version}\n\n\
         Module: {module}\n\
         Previous: {previous} ({current_version})\n\
         Target: {target} ({version})\n\
         Update-Type: {update_type}\n",
        module = ctx.module,
        version = ctx.target_version,
    );

    if let Some(report) = &ctx.post_validation {
        message.push_str(&format!("Quality-Score: {:.1}\n", report.overall_score));
        for warning in &report.warnings {
            message.push_str(&format!("Warning: {warning}\n"));
        }
    }
    if let Some(comparison) = &ctx.compatibility {
        message.push_str(&format!(
            "Compatibility: {:.1}\n",
            comparison.compatibility_score
        ));
    }
    message.push_str("Validation: passed\n");
    message
}
