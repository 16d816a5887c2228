use sqlx::MySqlPool;
use sqlx_propagation::{
    with_nested_transaction, with_new_transaction, with_transaction, TransactionManager,
};
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
    let manager = TransactionManager::mysql(pool.clone());

    println!("=== Nested and Independent Transaction Example ===\n");

    // Example 1: Successful nested transaction
    println!("1. Nested transaction - both succeed...");
    with_transaction(&manager, |tx| {
        Box::pin(async move {
            let mut session = tx.open_session().await?;
            session
                .execute("INSERT INTO users (name, email) VALUES ('David', 'david@example.com')")
                .await?;
            println!("   Outer: Created user");

            with_nested_transaction(tx, |nested_tx| {
                Box::pin(async move {
                    let mut session = nested_tx.open_session().await?;
                    session
                        .execute("INSERT INTO audit_log (user_id, action) VALUES (LAST_INSERT_ID(), 'User created')")
                        .await?;
                    println!("   Nested: Created audit log");
                    Ok(())
                })
            })
            .await?;

            println!("   ✓ Both committed with the outer transaction\n");
            Ok(())
        })
    })
    .await?;

    // Example 2: Nested transaction fails, outer succeeds
    println!("2. Nested transaction fails, outer succeeds...");
    with_transaction(&manager, |tx| {
        Box::pin(async move {
            let mut session = tx.open_session().await?;
            session
                .execute("INSERT INTO users (name, email) VALUES ('Eve', 'eve@example.com')")
                .await?;
            println!("   Outer: Created user");

            let nested_result = with_nested_transaction(tx, |nested_tx| {
                Box::pin(async move {
                    let mut session = nested_tx.open_session().await?;
                    // This will fail
                    session.execute("INSERT INTO non_existent_table VALUES (1)").await?;
                    Ok(())
                })
            })
            .await;

            match nested_result {
                Ok(_) => println!("   ✗ Nested should have failed!"),
                Err(e) => println!("   Nested: Rolled back to savepoint ({})", e),
            }

            println!("   ✓ Outer transaction committed (user created)\n");
            Ok(())
        })
    })
    .await?;

    // Example 3: Independent transaction survives the outer rollback
    println!("3. Independent transaction outlives a failed caller...");
    let result: sqlx_propagation::Result<()> = with_transaction(&manager, |tx| {
        Box::pin(async move {
            let mut session = tx.open_session().await?;
            session
                .execute("INSERT INTO users (name, email) VALUES ('Frank', 'frank@example.com')")
                .await?;

            with_new_transaction(tx, |new_tx| {
                Box::pin(async move {
                    let mut session = new_tx.open_session().await?;
                    session
                        .execute("INSERT INTO audit_log (user_id, action) VALUES (0, 'Signup attempted')")
                        .await?;
                    println!("   Independent: Audit entry committed");
                    Ok(())
                })
            })
            .await?;

            Err(sqlx_propagation::Error::processing("payment declined"))
        })
    })
    .await;

    if let Err(e) = result {
        println!("   Outer: {}", e);
        println!("   ✓ Frank was rolled back, the audit entry was kept\n");
    }

    println!("=== All nested transaction examples completed ===");

    pool.close().await;
    Ok(())
}
