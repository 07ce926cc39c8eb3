mod app;
mod audio;
mod band;
mod cli;
mod telemetry;

use color_eyre::eyre::Result;

use app::App;
use cli::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse_args()?;
    telemetry::init_tracing(cli.log_file.as_deref())?;

    if cli.list_input_devices {
        for name in audio::list_input_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let mut app = App::new(&cli);
    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal);
    ratatui::restore();
    result?;

    if let Some(summary) = app.final_summary() {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!(
                "Average {:.1} over {:.1}s of speech ({:.1}s recorded)",
                summary.final_average, summary.active_duration_secs, summary.elapsed_secs
            );
        }
    }
    Ok(())
}
