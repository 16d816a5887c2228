use sqlx::MySqlPool;
use sqlx_propagation::{with_transaction, Propagation, TransactionManager};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "mysql://localhost/test".to_string());
    let pool = MySqlPool::connect(&database_url).await?;
    let manager = TransactionManager::mysql(pool);

    println!("=== Basic Propagation Example ===\n");

    // Example 1: Simple INSERT
    println!("1. Creating a user...");
    with_transaction(&manager, |tx| {
        Box::pin(async move {
            let mut session = tx.open_session().await?;
            session
                .execute("INSERT INTO users (name, email) VALUES ('Alice', 'alice@example.com')")
                .await?;
            Ok(())
        })
    })
    .await?;
    println!("   ✓ User created successfully\n");

    // Example 2: Two sessions, one transaction
    println!("2. Creating user with profile...");
    let rows = with_transaction(&manager, |tx| {
        Box::pin(async move {
            let mut users = tx.open_session().await?;
            let mut profiles = tx.open_session().await?;

            let mut rows = users
                .execute("INSERT INTO users (name, email) VALUES ('Bob', 'bob@example.com')")
                .await?;
            rows += profiles
                .execute("INSERT INTO profiles (user_id, bio) VALUES (LAST_INSERT_ID(), 'Software Developer')")
                .await?;

            // Ignored: only the transaction commits its own work
            profiles.commit().await?;
            Ok(rows)
        })
    })
    .await?;
    println!("   ✓ {} rows committed together\n", rows);

    // Example 3: Error handling and automatic rollback
    println!("3. Testing automatic rollback on error...");
    let result: sqlx_propagation::Result<()> = with_transaction(&manager, |tx| {
        Box::pin(async move {
            let mut session = tx.open_session().await?;
            session
                .execute("INSERT INTO users (name, email) VALUES ('Charlie', 'charlie@example.com')")
                .await?;

            // This will cause an error
            session.execute("SELECT * FROM non_existent_table").await?;
            Ok(())
        })
    })
    .await;

    match result {
        Ok(_) => println!("   ✗ Unexpected success"),
        Err(e) => {
            println!("   ✓ Transaction rolled back: {}", e);
            if let Some(rollback) = e.rollback_error() {
                println!("     rollback also failed: {}", rollback);
            }
            println!("   ✓ Charlie was NOT inserted\n");
        }
    }

    // Example 4: Joining the caller's transaction
    println!("4. Joining an existing transaction...");
    manager
        .execute(Propagation::Required, |tx| {
            Box::pin(async move {
                register_user(tx, "Dave").await?;
                register_user(tx, "Erin").await?;
                Ok(())
            })
        })
        .await?;
    println!("   ✓ Both users committed by the outermost call\n");

    println!("=== All examples completed ===");

    Ok(())
}

/// Data-access helper that works alone or inside a caller's transaction.
async fn register_user(
    tx: &mut sqlx_propagation::TransactionContext<'_>,
    name: &str,
) -> sqlx_propagation::Result<()> {
    let sql = format!("INSERT INTO users (name, email) VALUES ('{name}', '{name}@example.com')");
    tx.execute(Propagation::Required, move |tx| {
        Box::pin(async move {
            let mut session = tx.open_session().await?;
            session.execute(&sql).await?;
            Ok(())
        })
    })
    .await
}
