//! Seed script for development: populates a fresh database with sample data.
//!
//! Usage: `cargo run --bin seed`
//!
//! Requires `DATABASE_URL` (reads .env).

use serde_json::json;
use sqlx::PgPool;

const ADMIN_PASSWORD: &str = "Admin123!";
const EMPLOYEE_PASSWORD: &str = "Tech123!";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let db_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = pmtrack::db::create_pool(&db_url, 5).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    println!("=== Maintenance portal seed ===");

    let admin_id = seed_user(&pool, "admin", "Administrator", "admin", ADMIN_PASSWORD).await?;
    seed_user(&pool, "tech", "Field Technician", "employee", EMPLOYEE_PASSWORD).await?;
    seed_templates(&pool, admin_id).await?;

    println!("\n=== Seed complete! ===");
    println!("Admin login:    admin / {ADMIN_PASSWORD}");
    println!("Employee login: tech / {EMPLOYEE_PASSWORD}");

    Ok(())
}

async fn seed_user(
    pool: &PgPool,
    username: &str,
    display_name: &str,
    role: &str,
    password: &str,
) -> anyhow::Result<uuid::Uuid> {
    let hash = pmtrack::services::auth::hash_password(password)?;

    let id = sqlx::query_scalar::<_, uuid::Uuid>(
        r#"
        INSERT INTO users (username, email, password_hash, display_name, role)
        VALUES ($1, $2, $3, $4, $5::user_role)
        ON CONFLICT (username) DO UPDATE SET password_hash = EXCLUDED.password_hash
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(format!("{username}@pmtrack.local"))
    .bind(&hash)
    .bind(display_name)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("[done] User '{username}' ({role})");
    Ok(id)
}

async fn seed_templates(pool: &PgPool, admin_id: uuid::Uuid) -> anyhow::Result<()> {
    let templates = [
        (
            "computer",
            "Desktop Computer - Quarterly",
            json!({
                "asset_tag": {"label": "Asset Tag", "required": true},
                "serial_number": {"label": "Serial Number", "required": true},
                "location": {"label": "Location"},
                "user_name": {"label": "Assigned User"}
            }),
            json!(["Hostname", "IP Address", "Operating System", "Antivirus"]),
            json!({}),
            json!([
                {
                    "title": "Hardware",
                    "order": 1,
                    "columns": ["Condition", "Remark"],
                    "items": ["Casing", "Monitor", "Keyboard", "Mouse", "Power Supply Fan"]
                },
                {
                    "title": "Software",
                    "order": 2,
                    "columns": ["Done", "Remark"],
                    "items": ["OS Updates", "Antivirus Definitions", "Disk Cleanup"]
                }
            ]),
        ),
        (
            "ups",
            "UPS - Semiannual",
            json!({
                "serial_number": {"label": "Serial Number", "required": true},
                "capacity_va": {"label": "Capacity (VA)", "field_type": "number"}
            }),
            json!(["Firmware"]),
            json!({
                "battery_install_date": {"label": "Battery Install Date", "field_type": "date"}
            }),
            json!([
                {
                    "title": "Battery",
                    "order": 1,
                    "columns": ["Result", "Remark"],
                    "items": ["Voltage", "Terminals", "Self Test"]
                }
            ]),
        ),
    ];

    for (category, name, device_fields, configuration_items, special_fields, items) in templates {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM templates WHERE name = $1)")
                .bind(name)
                .fetch_one(pool)
                .await?;
        if exists {
            println!("[skip] Template '{name}' already exists");
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO templates (category, name, device_fields, configuration_items,
                special_fields, items, created_by)
            VALUES ($1::device_category, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(category)
        .bind(name)
        .bind(device_fields)
        .bind(configuration_items)
        .bind(special_fields)
        .bind(items)
        .bind(admin_id)
        .execute(pool)
        .await?;
        println!("[done] Template '{name}'");
    }
    Ok(())
}
