use photo_upload::{HttpUploadClient, UploadClientConfig};
use std::path::PathBuf;
use std::sync::Arc;
use survey_capture::camera::{ImageSource, NoCamera};
use survey_capture::config::{AppConfig, DEFAULT_CONFIG_FILE};
use survey_capture::database::Store;
use survey_capture::error::AppError;
use survey_capture::models::{EntityRef, EntityType, PhotoType, SyncSettings};
use survey_capture::services::{
    start_background_sync, summary_service, sync_service, PhotoService, SyncEngine,
};
use uuid::Uuid;

const USAGE: &str = "Usage: survey-capture [--config PATH] [COMMAND]

Commands:
  run                                        Upload pending photos until Ctrl+C (default)
  status                                     Print project summaries and upload state as JSON
  import <ENTITY_TYPE> <ID> <PHOTO_TYPE> <FILE>  Add an image file as a photo
  retry                                      Queue all abandoned photos again
  server <URL>                               Store the upload server and enable uploads
  pause                                      Stop uploads until resumed
  resume                                     Allow uploads again";

enum Command {
    Run,
    Status,
    Import {
        entity: EntityRef,
        photo_type: PhotoType,
        file: PathBuf,
    },
    Retry,
    Server(String),
    Pause,
    Resume,
}

struct Args {
    config_path: PathBuf,
    command: Command,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config_path = args
                    .next()
                    .map(PathBuf::from)
                    .ok_or("--config needs a path")?;
            }
            "--help" | "-h" => return Err(USAGE.to_string()),
            _ => positional.push(arg),
        }
    }

    let command = match positional.first().map(String::as_str) {
        None | Some("run") => Command::Run,
        Some("status") => Command::Status,
        Some("retry") => Command::Retry,
        Some("pause") => Command::Pause,
        Some("resume") => Command::Resume,
        Some("server") => {
            let [_, url] = positional.as_slice() else {
                return Err(USAGE.to_string());
            };
            Command::Server(url.clone())
        }
        Some("import") => {
            let [_, entity_type, id, photo_type, file] = positional.as_slice() else {
                return Err(USAGE.to_string());
            };
            let entity_type = EntityType::from_str(&entity_type.to_uppercase())
                .ok_or_else(|| format!("Unknown entity type '{}'", entity_type))?;
            let id = Uuid::parse_str(id).map_err(|e| format!("Invalid id '{}': {}", id, e))?;
            let photo_type = PhotoType::from_str(&photo_type.to_uppercase())
                .ok_or_else(|| format!("Unknown photo type '{}'", photo_type))?;
            Command::Import {
                entity: EntityRef::new(entity_type, id),
                photo_type,
                file: PathBuf::from(file),
            }
        }
        Some(other) => return Err(format!("Unknown command '{}'\n\n{}", other, USAGE)),
    };

    Ok(Args {
        config_path,
        command,
    })
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args).await {
        log::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let config = AppConfig::load(&args.config_path)?;
    let store = Store::open(&config.database_path)?;

    let server_url = store.read(|conn| sync_service::upload_server_url(conn, &config.server_url))?;
    let client = HttpUploadClient::new(UploadClientConfig {
        base_url: server_url,
        timeout_secs: config.request_timeout_secs,
    })?;
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        Arc::new(client),
        config.retry_policy(),
    ));
    let photos = PhotoService::new(store.clone(), Arc::new(NoCamera), config.photo_dir.clone())
        .with_sync(engine.clone());

    match args.command {
        Command::Run => {
            match engine.test_connection().await {
                Ok(_) => {}
                Err(e) => log::warn!("Upload server not reachable yet: {}", e),
            }

            let handle = start_background_sync(engine.clone(), config.sync_interval());
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl+C: {}", e);
            }
            engine.cancel_all();
            if let Err(e) = handle.await {
                log::error!("Background sync task failed: {}", e);
            }
        }
        Command::Status => {
            let status = serde_json::json!({
                "projects": summary_service::list_project_summaries(&store)?,
                "uploads": summary_service::upload_overview(&store)?,
            });
            let text = serde_json::to_string_pretty(&status)
                .map_err(|e| AppError::Other(e.to_string()))?;
            println!("{}", text);
        }
        Command::Import {
            entity,
            photo_type,
            file,
        } => {
            let photo = photos
                .capture(entity, photo_type, ImageSource::File(file))
                .await?;
            println!("{}", photo.path);

            let report = engine.sync_pending().await?;
            engine.record_cycle(&report);
            if report.uploaded == 0 {
                log::info!("Photo stays queued for the next sync run");
            }
        }
        Command::Retry => {
            let count = engine.retry_all_abandoned()?;
            println!("{} photos queued again", count);
        }
        Command::Server(url) => {
            let settings = SyncSettings::new(url);
            store.read(|conn| sync_service::save_sync_settings(conn, &settings))?;
            println!("Uploading to {}", settings.server_url);
        }
        Command::Pause => switch_sync(&store, &config, false)?,
        Command::Resume => switch_sync(&store, &config, true)?,
    }

    Ok(())
}

fn switch_sync(store: &Store, config: &AppConfig, enabled: bool) -> Result<(), AppError> {
    let settings = store.read(|conn| sync_service::switch_sync(conn, enabled, &config.server_url))?;
    println!(
        "Uploads to {} {}",
        settings.server_url,
        if settings.enabled { "enabled" } else { "paused" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, String> {
        parse_args(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_defaults_to_run() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.config_path, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(matches!(args.command, Command::Run));
    }

    #[test]
    fn test_import_arguments() {
        let id = Uuid::new_v4();
        let id_text = id.to_string();
        let args = parse(&[
            "--config",
            "/etc/survey.toml",
            "import",
            "track_point",
            &id_text,
            "end_point",
            "/tmp/a.jpg",
        ])
        .unwrap();
        assert_eq!(args.config_path, PathBuf::from("/etc/survey.toml"));
        match args.command {
            Command::Import {
                entity,
                photo_type,
                file,
            } => {
                assert_eq!(entity, EntityRef::TrackPoint(id));
                assert_eq!(photo_type, PhotoType::EndPoint);
                assert_eq!(file, PathBuf::from("/tmp/a.jpg"));
            }
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn test_settings_commands() {
        match parse(&["server", "https://survey.example.org"]).unwrap().command {
            Command::Server(url) => assert_eq!(url, "https://survey.example.org"),
            _ => panic!("expected server"),
        }
        assert!(matches!(parse(&["pause"]).unwrap().command, Command::Pause));
        assert!(matches!(parse(&["resume"]).unwrap().command, Command::Resume));
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse(&["import", "project"]).is_err());
        assert!(parse(&["import", "boat", &Uuid::new_v4().to_string(), "FRONT", "x"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["server"]).is_err());
    }
}
