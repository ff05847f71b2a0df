use crate::backend::{BookingStore, StoreError};
use crate::schema::bookings;
use crate::types::{NewBooking, StoreInfo};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sql_types::Text;
use diesel::{PgConnection, QueryDsl, RunQueryDsl};
use std::time::Duration;

const TABLE_NAME: &str = "bookings";
const POOL_SIZE: u32 = 5;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS bookings (
    id SERIAL PRIMARY KEY,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    full_name TEXT NOT NULL,
    email TEXT NOT NULL
)";

// Columns added after the table was first created. Only ever append here.
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[
    ("phone", "TEXT"),
    ("company", "TEXT"),
    ("date", "DATE"),
    ("time", "TEXT"),
    ("time_zone", "TEXT"),
    ("duration_minutes", "INTEGER"),
    ("start_utc", "TIMESTAMPTZ"),
    ("end_utc", "TIMESTAMPTZ"),
    ("notes", "TEXT"),
    ("source", "TEXT"),
];

pub fn schema_statements() -> Vec<String> {
    let mut statements = vec![CREATE_TABLE.to_string()];
    statements.extend(ADDITIVE_COLUMNS.iter().map(|(column, sql_type)| {
        format!("ALTER TABLE {TABLE_NAME} ADD COLUMN IF NOT EXISTS {column} {sql_type}")
    }));
    statements
}

const COLUMNS_QUERY: &str = "SELECT column_name::text AS column_name FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = 'bookings' ORDER BY ordinal_position";

#[derive(QueryableByName)]
struct ColumnName {
    #[diesel(sql_type = Text)]
    column_name: String,
}

#[derive(Clone)]
pub struct DatabaseInterface {
    pool: Pool<ConnectionManager<PgConnection>>,
}

impl DatabaseInterface {
    /// Connections are opened lazily, so an unreachable database does not
    /// prevent startup.
    pub fn new(database_url: &str) -> Self {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(POOL_SIZE)
            .connection_timeout(Duration::from_secs(5))
            .build_unchecked(manager);
        Self { pool }
    }

    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, StoreError> {
        Ok(self.pool.get()?)
    }
}

impl BookingStore for DatabaseInterface {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut connection = self.connection()?;
        connection.batch_execute(&schema_statements().join(";\n"))?;
        Ok(())
    }

    fn insert_booking(&self, booking: &NewBooking) -> Result<i32, StoreError> {
        let mut connection = self.connection()?;
        let id = diesel::insert_into(bookings::table)
            .values(booking)
            .returning(bookings::id)
            .get_result::<i32>(&mut connection)?;
        Ok(id)
    }

    fn info(&self) -> Result<StoreInfo, StoreError> {
        let mut connection = self.connection()?;

        let columns: Vec<String> = diesel::sql_query(COLUMNS_QUERY)
            .load::<ColumnName>(&mut connection)?
            .into_iter()
            .map(|column| column.column_name)
            .collect();

        let table_exists = !columns.is_empty();
        let row_count = if table_exists {
            bookings::table.count().get_result::<i64>(&mut connection)?
        } else {
            0
        };

        Ok(StoreInfo {
            backend: "postgres".into(),
            table_exists,
            columns,
            row_count,
        })
    }
}
