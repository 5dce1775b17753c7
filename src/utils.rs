// ABOUTME: Small helpers shared by the store adapters
// ABOUTME: Identifier quoting and password masking for log output

/// Quote a SQL identifier (table, column) for PostgreSQL and SQLite.
///
/// Escapes embedded quotes and wraps the identifier in double quotes.
pub fn quote_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('"');
    for ch in identifier.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Mask the password of a connection URL so it can be logged.
///
/// Strings that are not URLs (SQLite paths) are returned unchanged.
pub fn sanitize_connection_string(connection: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(connection) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("***"));
            return parsed.to_string();
        }
    }
    connection.to_string()
}
