use sqlx::{mysql::MySqlPoolOptions, MySql, Pool};

use super::environment::Config;

pub type DbPool = Pool<MySql>;

pub async fn init_db(config: &Config) -> Result<DbPool, sqlx::Error> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
