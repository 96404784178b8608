use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use ephemail::address::{AddressAllocator, AddressService, Attribution};
use ephemail::mail::MailIngestionPipeline;
use ephemail::smtp::{self, SessionSettings, SmtpServer};
use ephemail::{Config, Database, RetentionSweeper};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = ephemail::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        ephemail::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let db = match Database::open_with_config(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    // `ephemail allocate` prints a fresh address and exits
    if std::env::args().nth(1).as_deref() == Some("allocate") {
        let allocator = AddressAllocator::new(db.clone(), &config.mail.domain, config.mail.ttl())
            .with_max_attempts(config.mail.max_allocation_attempts);
        let result = allocator
            .allocate(&Attribution::new().with_user_agent("ephemail-cli"))
            .await;
        db.close().await;
        match result {
            Ok(address) => println!("{}\t{}", address.address, address.expires_at),
            Err(e) => {
                error!("Allocation failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    info!("ephemail starting for domain {}", config.mail.domain);

    let pipeline =
        MailIngestionPipeline::new(db.clone()).with_max_message_bytes(config.smtp.max_message_bytes);
    let mut settings = SessionSettings::from_config(&config);
    if config.smtp.tls.enable {
        match smtp::load_acceptor(&config.smtp.tls) {
            Ok(acceptor) => {
                info!("STARTTLS enabled with {}", config.smtp.tls.cert_file);
                settings = settings.with_tls(acceptor);
            }
            Err(e) => {
                error!("Failed to load TLS certificate: {}", e);
                std::process::exit(1);
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Arc::new(RetentionSweeper::new(
        AddressService::new(db.clone(), &config.mail.domain),
        Duration::from_secs(config.retention.sweep_interval_secs),
    ));
    let sweeper_handle = sweeper.spawn(shutdown_rx);

    let mut failed = false;
    match SmtpServer::bind(&config.smtp).await {
        Ok(server) => {
            tokio::select! {
                result = server.serve(pipeline, settings) => {
                    if let Err(e) = result {
                        error!("SMTP server stopped: {}", e);
                        failed = true;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                }
            }
        }
        Err(e) => {
            error!("Failed to bind SMTP server: {}", e);
            failed = true;
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_handle.await {
        error!("Retention sweeper task failed: {}", e);
    }

    db.close().await;
    info!("ephemail stopped");

    if failed {
        std::process::exit(1);
    }
}
