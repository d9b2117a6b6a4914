use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Adds a bar counting `unit`s to `multi`; without a known total it falls
/// back to a spinner.
pub fn create_progress_bar(
    multi: &MultiProgress,
    total: Option<u64>,
    unit: &str,
    message: &'static str,
) -> Result<ProgressBar> {
    let pb = if let Some(total) = total {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(&format!(
            "{{bar:40.cyan/blue}} {{pos}}/{{len}} {unit} ({{percent}}%)\n{{msg}} | elapsed: {{elapsed_precise}} | ETA: {{eta_precise}}"
        ))?);
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(&format!(
            "{{spinner:.green}} {{pos}} {unit}\n{{msg}} | elapsed: {{elapsed_precise}}"
        ))?);
        pb
    };

    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(message);
    Ok(pb)
}
