//! Binding `QueryParam` values onto engine-specific sqlx queries.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

/// One binder per engine; the match is identical, only the query type differs.
macro_rules! param_binder {
    ($name:ident, $lt:lifetime, $db:ty, $args:ty) => {
        pub(crate) fn $name<$lt>(
            query: Query<$lt, $db, $args>,
            param: &$lt QueryParam,
        ) -> Query<$lt, $db, $args> {
            match param {
                QueryParam::Null => query.bind(None::<String>),
                QueryParam::Bool(v) => query.bind(*v),
                QueryParam::Int(v) => query.bind(*v),
                QueryParam::Float(v) => query.bind(*v),
                QueryParam::String(v) => query.bind(v.as_str()),
            }
        }
    };
}

param_binder!(bind_mysql_param, 'q, MySql, MySqlArguments);
param_binder!(bind_postgres_param, 'q, Postgres, PgArguments);
param_binder!(bind_sqlite_param, 'q, Sqlite, SqliteArguments<'q>);
