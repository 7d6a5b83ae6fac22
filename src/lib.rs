use std::error::Error;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod model;
pub mod registry;
pub mod routes;

#[cfg(test)]
mod test_support;

pub fn unpack_error(err: &dyn Error) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;

    #[test]
    fn unpack_error_flattens_plain_errors() {
        let err = LedgerError::user_not_found(3);
        assert_eq!(unpack_error(&err), "user 3 not found");
    }
}
