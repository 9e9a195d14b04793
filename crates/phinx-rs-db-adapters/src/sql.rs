//! SQL text helpers shared by the dialects.

/// Quotes an identifier with double quotes, doubling embedded quotes.
///
/// ```
/// use phinx_rs_db_adapters::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("users"), r#""users""#);
/// assert_eq!(quote_identifier(r#"odd"name"#), r#""odd""name""#);
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Renders a string literal, doubling embedded single quotes.
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Joins quoted identifiers with `, `.
pub fn quote_identifier_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_identifier(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Makes free text safe to embed inside a `/* ... */` comment.
pub fn escape_comment(text: &str) -> String {
    text.replace("*/", "* /")
}

/// Returns `true` if `sql` holds more than one statement.
///
/// Semicolons inside quoted strings, quoted identifiers, and comments do not
/// count, and a single trailing semicolon is allowed.
pub fn has_multiple_statements(sql: &str) -> bool {
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    let mut seen_terminator = false;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                if seen_terminator {
                    return true;
                }
                quote = Some(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            ';' => seen_terminator = true,
            c if c.is_whitespace() => {}
            _ => {
                if seen_terminator {
                    return true;
                }
            }
        }
    }
    false
}
