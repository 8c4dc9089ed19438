pub mod photo;

pub use photo::PhotoRepository;

use super::CatalogError;
use rusqlite::{Connection, Params, Row};

pub trait Repository {
    fn conn(&self) -> &Connection;

    /// Run `sql` with ordered `params` and map every result row to a typed value.
    fn query_rows<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>, CatalogError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn().prepare_cached(sql)?;
        let rows = stmt.query_map(params, f)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, CatalogError> {
        let mut stmt = self.conn().prepare_cached(sql)?;
        Ok(stmt.execute(params)?)
    }
}
