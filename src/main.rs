use ai_horror_shorts::config::Config;
use ai_horror_shorts::init;
use ai_horror_shorts::pipeline::PipelineRunner;
use anyhow::Result;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    init::ensure_directories().await?;

    if !init::check_ffmpeg().await {
        eprintln!("[WARNING] FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let cfg = Config::load("config.json").await?;

    if !cfg.keep_scratch {
        let swept = init::sweep_stale_runs(Path::new(init::SCRATCH_ROOT)).await?;
        if swept > 0 {
            eprintln!("[INFO] Swept {} stale scratch run(s)", swept);
        }
    }

    let runner = PipelineRunner::new(cfg)?;
    match runner.run().await {
        Ok(report) => {
            match &report.video_id {
                Some(id) => eprintln!("[OK] \"{}\" published as {}", report.title, id),
                None => eprintln!(
                    "[OK] \"{}\" rendered to {} (not uploaded)",
                    report.title,
                    report.output.display()
                ),
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("[ERROR] {:#}", err);
            std::process::exit(1);
        }
    }
}
