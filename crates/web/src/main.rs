use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tenant_web::certificate::{CertificateStore, MemoryCertificateStore, PemDirectoryStore};
use tenant_web::config::ServerSettings;
use tenant_web::{Application, Server, ServerError, StatusPages};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const USAGE: &str = "usage: tenant-server <settings.json>";

#[tokio::main]
async fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    let Some(path) = env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    match run(path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(cause = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: PathBuf) -> Result<(), ServerError> {
    let settings = ServerSettings::load(&path)?;
    info!(settings = %path.display(), name = %settings.name, "loaded settings");

    let store: Arc<dyn CertificateStore> = match &settings.certificate_dir {
        Some(dir) => Arc::new(PemDirectoryStore::new(dir.clone())),
        None => Arc::new(MemoryCertificateStore::new()),
    };

    let mut builder = Server::builder()
        .name(&settings.name)
        .session_ttl(settings.session_ttl())
        .request_timeout(settings.request_timeout())
        .cors_override(settings.cors_override)
        .status_pages(StatusPages::from_entries(&settings.status_pages)?);
    for binding in &settings.bindings {
        builder = builder.binding(binding.address, binding.scheme.into());
    }
    let server = builder.build()?;

    for entry in &settings.applications {
        let application = Application::builder()
            .root(&entry.root)
            .virtual_service(entry.virtual_service)
            .bindings(entry.bindings.clone())
            .certificate_store(Arc::clone(&store))
            .build();

        match application.and_then(|application| server.add_application(application)) {
            Ok(application) => info!(root = %entry.root.display(), id = %application.id(), "application registered"),
            Err(e) => warn!(root = %entry.root.display(), cause = %e, "skipping application"),
        }
    }

    server.start().await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(cause = %e, "can't listen for ctrl-c, stopping");
    }

    info!("shutting down");
    server.shutdown().await;
    Ok(())
}
