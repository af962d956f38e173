//! Basic example of the Depot container.

use std::sync::Arc;

use depot::prelude::*;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct Config {
    database_url: String,
    debug: bool,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

impl Stoppable for Database {
    fn stop(&self) -> std::result::Result<(), BoxError> {
        println!("🔌 Closing connection to {}", self.url);
        Ok(())
    }
}

impl HealthProbe for Database {
    fn probe(&self) -> std::result::Result<bool, BoxError> {
        Ok(true)
    }
}

struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

/// Per-request identity, only registered inside a request scope.
struct CurrentUser {
    id: u64,
}

struct UserService {
    repo: Arc<UserRepository>,
    logger: Arc<dyn Logger>,
}

impl UserService {
    fn get_user(&self, id: u64) -> String {
        self.logger.log(&format!("Getting user {id}"));
        self.repo.find_user(id)
    }
}

fn handle_request(container: &Container, user_id: u64) -> Result<()> {
    container.with_scope(":request", |scope| {
        scope.instance(CurrentUser { id: user_id })?;

        let user = scope.get::<CurrentUser>()?;
        let service = scope.get::<UserService>()?;
        println!("👤 {}", service.get_user(user.id));
        Ok(())
    })
}

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("depot_container=debug")
        .init();

    // Build the container
    let container = Container::builder()
        // Config: singleton value (already created)
        .singleton_value(Config {
            database_url: "postgres://localhost/myapp".to_string(),
            debug: true,
        })
        // Logger: interface binding
        .bind_with::<dyn Logger, ConsoleLogger>(|_| Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>))
        // Database: singleton with shutdown and health hooks
        .provider(
            ServiceKey::of::<Database>(),
            Provider::singleton(|c| {
                let config = c.get::<Config>()?;
                let logger = c.get::<dyn Logger>()?;
                Ok(Arc::new(Database {
                    url: config.database_url.clone(),
                    logger,
                }))
            })
            .stoppable()
            .probed(),
        )
        .singleton_with(|c| Ok(UserRepository { db: c.get()? }))
        // UserService: transient (new each time)
        .transient_with(|c| {
            Ok(UserService {
                repo: c.get()?,
                logger: c.get::<dyn Logger>()?,
            })
        })
        .build()?;

    println!("✅ Container built successfully!");
    println!("{container:?}");

    let config = container.get::<Config>()?;
    println!("📋 Config: database_url={}, debug={}", config.database_url, config.debug);

    // === One scope per request ===
    handle_request(&container, 42)?;
    handle_request(&container, 7)?;

    match container.get::<CurrentUser>() {
        Err(err) => println!("🔒 Outside a request:\n{err}"),
        Ok(_) => println!("unexpected: CurrentUser leaked out of its scope"),
    }

    for (key, healthy) in container.health_check().iter() {
        println!("🩺 {}: {}", key.short(), if healthy { "healthy" } else { "DOWN" });
    }

    container.shutdown()?;
    println!("\n🎉 Everything works!");
    Ok(())
}
