use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::ProgressBar;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use verbatim::cli::HistoryAction;
use verbatim::pipeline::{SkipReason, Studio};
use verbatim::progress::{percent_bar, spinner};
use verbatim::{
    output, utils, ApiClient, Backend, Cli, Commands, Config, Identity, IntakeController,
    MediaAsset, PipelineState, SubmitOutcome, Transcoder,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "verbatim=debug" } else { "verbatim=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load(cli.config.as_deref()).await?;
    if let Some(user_id) = cli.user_id.clone() {
        config.identity.user_id = Some(user_id);
    }

    match cli.command {
        Commands::Process {
            file,
            output,
            format,
            sections,
            no_extract,
        } => {
            if no_extract {
                config.transcoder.enabled = false;
            }

            let controller = controller(&config)?;
            let asset = MediaAsset::from_path(&file).await?;
            tracing::info!(
                "Processing {} ({})",
                asset.filename(),
                utils::format_file_size(asset.len() as u64)
            );
            controller.select_file(asset);

            let watcher = render_progress(controller.subscribe(), cli.quiet);
            let outcome = controller.submit().await;

            let result = match outcome {
                SubmitOutcome::Succeeded(result) => {
                    let _ = watcher.await;
                    result
                }
                SubmitOutcome::Failed(e) => {
                    let _ = watcher.await;
                    anyhow::bail!(e.user_message());
                }
                SubmitOutcome::Skipped(reason) => {
                    watcher.abort();
                    anyhow::bail!(skip_message(reason));
                }
                SubmitOutcome::Busy => {
                    watcher.abort();
                    anyhow::bail!("A submission is already in progress.");
                }
            };

            match output {
                Some(path) => {
                    output::save_to_file(&result, &path, &format).await?;
                    println!("Result saved to: {}", path.display());
                }
                None => {
                    output::print_to_console(&result, &format)?;
                }
            }

            if let Some(dir) = sections {
                for path in output::save_sections(&result, &dir)? {
                    println!("Saved: {}", path.display());
                }
            }
        }
        Commands::Extract {
            file,
            output,
            format,
        } => {
            if let Some(format) = format {
                config.transcoder.output_format = format;
            }

            if let Some(path) = &output {
                if utils::same_path(path, &file) {
                    anyhow::bail!("Refusing to overwrite the input file {}", file.display());
                }
            }

            let transcoder = Transcoder::from_config(&config.transcoder);
            let asset = MediaAsset::from_path(&file).await?;

            let bar = percent_bar("Extracting audio", cli.quiet);
            let progress = {
                let bar = bar.clone();
                Arc::new(move |percent: u8| bar.set_position(percent as u64))
            };
            let derived = transcoder.transcode(&asset, progress).await;
            bar.finish_and_clear();

            let derived = derived.context("Local audio extraction failed")?;
            let path = output.unwrap_or_else(|| utils::extracted_audio_path(&file, derived.filename()));
            fs_err::write(&path, derived.data())?;

            println!(
                "Audio saved to: {} ({} -> {})",
                path.display(),
                utils::format_file_size(asset.len() as u64),
                utils::format_file_size(derived.len() as u64)
            );
        }
        Commands::Dub {
            item,
            language,
            voice,
            emotion,
            source,
        } => {
            let controller = signed_in_controller(&config)?;
            controller
                .refresh_history()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            if !controller.load_from_history(&item) {
                anyhow::bail!("No history item with id '{}'", item);
            }
            let result = controller
                .current_result()
                .context("History item could not be loaded")?;

            let studio = Studio::new(backend(&config)?, &config.studio);
            if let Err(e) = studio.load_languages().await {
                tracing::debug!("Language catalog unavailable: {}", e);
            }

            let language = language.unwrap_or_else(|| config.studio.default_language.clone());
            studio
                .set_language(&language)
                .await
                .map_err(anyhow::Error::msg)?;

            if let Some(voice) = voice {
                if !studio.select_voice(&voice) {
                    anyhow::bail!("Voice '{}' is not available for {}", voice, language);
                }
            }
            if let Some(emotion) = emotion {
                studio.set_emotion(&emotion);
            }
            if let Some(source) = source {
                studio.set_source(source);
            }

            let spinner = spinner("Generating voice track...", cli.quiet);
            let dub = studio.generate(&result).await;
            spinner.finish_and_clear();

            let dub = dub.map_err(anyhow::Error::msg)?;
            if let Some(text) = &dub.translated_text {
                println!("{}\n{}\n", style("Translated text:").bold(), text);
            }
            println!("Audio: {}", dub.audio_url);
        }
        Commands::Languages => {
            let languages = backend(&config)?
                .languages()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            for language in languages {
                println!("  • {}", language);
            }
        }
        Commands::Voices { language } => {
            let voices = backend(&config)?
                .voices(&language)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            if voices.is_empty() {
                println!("No voices available for {}", language);
            }
            for voice in voices {
                match voice.gender {
                    Some(gender) => println!("  • {} ({}, {})", voice.name, voice.id, gender),
                    None => println!("  • {} ({})", voice.name, voice.id),
                }
            }
        }
        Commands::History { action } => {
            let controller = signed_in_controller(&config)?;
            controller
                .refresh_history()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            match action {
                HistoryAction::List => {
                    print!("{}", output::format_history(&controller.history()));
                }
                HistoryAction::Show { item, format } => {
                    if !controller.load_from_history(&item) {
                        anyhow::bail!("No history item with id '{}'", item);
                    }
                    let result = controller
                        .current_result()
                        .context("History item could not be loaded")?;
                    output::print_to_console(&result, &format)?;
                }
                HistoryAction::Delete { item } => {
                    controller
                        .delete_history_item(&item)
                        .await
                        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
                    println!("Deleted {}", item);
                }
            }
        }
        Commands::Check => {
            let missing =
                utils::check_dependencies(&config.transcoder.ffmpeg_path, &config.transcoder.ffprobe_path)
                    .await;
            if missing.is_empty() {
                let transcoder = Transcoder::from_config(&config.transcoder);
                match transcoder.ensure_ready().await {
                    Ok(()) => println!(
                        "{} Local audio extraction available ({})",
                        style("✓").green(),
                        config.transcoder.output_format
                    ),
                    Err(e) => println!("{} Local audio extraction unavailable: {}", style("✗").red(), e),
                }
            } else {
                println!("{} Local audio extraction unavailable, files will be uploaded as-is:", style("✗").red());
                for dep in missing {
                    println!("   • {}", dep);
                }
            }

            println!("Backend: {}", config.base_url()?);
            match &config.identity.user_id {
                Some(user_id) => println!("Signed in as: {}", user_id),
                None => println!("Not signed in (use --user-id or VERBATIM_USER_ID)"),
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
                println!("Edit it to change the backend, identity, extraction and dubbing settings.");
            }
        }
    }

    Ok(())
}

fn backend(config: &Config) -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(ApiClient::from_config(config)?))
}

fn controller(config: &Config) -> Result<IntakeController> {
    let controller = IntakeController::new(
        backend(config)?,
        Arc::new(Transcoder::from_config(&config.transcoder)),
    );
    if let Some(user_id) = &config.identity.user_id {
        controller.sign_in(Identity::new(user_id.clone()));
    }
    Ok(controller)
}

fn signed_in_controller(config: &Config) -> Result<IntakeController> {
    let controller = controller(config)?;
    if controller.identity().is_none() {
        anyhow::bail!(skip_message(SkipReason::NotSignedIn));
    }
    Ok(controller)
}

fn skip_message(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::NotSignedIn => {
            "Not signed in. Pass --user-id, set VERBATIM_USER_ID or identity.user_id in the config file."
        }
        SkipReason::NoFileSelected => "No file selected.",
    }
}

/// Mirror pipeline progress onto terminal bars until the submission settles
fn render_progress(mut state: watch::Receiver<PipelineState>, quiet: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut extract: Option<ProgressBar> = None;
        let mut upload: Option<ProgressBar> = None;

        loop {
            let current = state.borrow_and_update().clone();
            match current {
                PipelineState::Idle => {}
                PipelineState::Preprocessing { progress } => {
                    extract
                        .get_or_insert_with(|| percent_bar("Extracting audio", quiet))
                        .set_position(progress as u64);
                }
                PipelineState::Uploading { progress, derived } => {
                    if let Some(bar) = extract.take() {
                        bar.finish_and_clear();
                    }
                    let bar = upload.get_or_insert_with(|| {
                        percent_bar(
                            if derived { "Uploading extracted audio" } else { "Uploading" },
                            quiet,
                        )
                    });
                    bar.set_position(progress as u64);
                    if progress >= 100 {
                        bar.set_message("Processing on server...");
                    }
                }
                PipelineState::Succeeded(_) | PipelineState::Failed(_) => break,
            }

            if state.changed().await.is_err() {
                break;
            }
        }

        for bar in [extract, upload].into_iter().flatten() {
            bar.finish_and_clear();
        }
    })
}
