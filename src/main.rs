use dotenvy::dotenv;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use stadion::router::init_router;
use stadion::state::init_app_state;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "create-admin" {
        handle_create_admin(args).await;
        return;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}=debug,tower_http=debug,axum::rejection=trace",
                    env!("CARGO_CRATE_NAME")
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = init_app_state().await;
    let app = init_router(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    println!("🚀 Server running on http://localhost:3000");
    println!("📚 Swagger UI available at http://localhost:3000/swagger-ui");
    axum::serve(listener, app).await.unwrap();
}

/// Admin accounts cannot be created over the API; this is the bootstrap
/// path for the first one.
async fn handle_create_admin(args: Vec<String>) {
    if args.len() != 6 {
        eprintln!(
            "Usage: {} create-admin <first_name> <last_name> <email> <password>",
            args[0]
        );
        std::process::exit(1);
    }

    let first_name = &args[2];
    let last_name = &args[3];
    let email = &args[4];
    let password = &args[5];

    if let Err(e) = stadion::utils::password::validate_password_policy(password) {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    let hashed = stadion::utils::password::hash_password(password)
        .expect("Failed to hash password");

    let result = sqlx::query(
        "INSERT INTO users (first_name, last_name, email, password, role, is_email_verified)
         VALUES ($1, $2, $3, $4, 'admin', TRUE)",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(email.trim().to_lowercase())
    .bind(&hashed)
    .execute(&pool)
    .await;

    match result {
        Ok(_) => {
            println!("✅ Admin account created");
            println!("   Email: {email}");
            println!("   Name: {first_name} {last_name}");
        }
        Err(e) => {
            eprintln!("❌ Error creating admin: {e}");
            std::process::exit(1);
        }
    }
}
