//! Parsing of `.sql` migration files.
//!
//! A file holds two sections introduced by marker comments:
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE users (id INT PRIMARY KEY);
//!
//! -- migrate:down
//! DROP TABLE users;
//! ```
//!
//! A file without markers is treated as up-only. Text above a lone
//! `-- migrate:down` marker is the up section.

pub const UP_MARKER: &str = "-- migrate:up";
pub const DOWN_MARKER: &str = "-- migrate:down";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlSections {
    pub up: String,
    pub down: String,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Up,
    Down,
}

pub fn parse_sections(content: &str) -> SqlSections {
    let has_markers = content.lines().any(|l| is_marker(l, UP_MARKER) || is_marker(l, DOWN_MARKER));
    if !has_markers {
        return SqlSections {
            up: content.trim().to_string(),
            down: String::new(),
        };
    }

    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut current = if content.lines().any(|l| is_marker(l, UP_MARKER)) {
        Section::Preamble
    } else {
        Section::Up
    };

    for line in content.lines() {
        if is_marker(line, UP_MARKER) {
            current = Section::Up;
            continue;
        }
        if is_marker(line, DOWN_MARKER) {
            current = Section::Down;
            continue;
        }
        match current {
            Section::Up => up.push(line),
            Section::Down => down.push(line),
            Section::Preamble => {}
        }
    }

    SqlSections {
        up: up.join("\n").trim().to_string(),
        down: down.join("\n").trim().to_string(),
    }
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.trim().eq_ignore_ascii_case(marker)
}

/// Split a script on `;`, ignoring separators inside quotes and comments.
/// Comments are dropped; empty statements are skipped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' && q != '`' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == q {
                // A doubled quote is an escaped quote, not the end.
                if chars.peek() == Some(&q) {
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if starts_line_comment(&chars) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '#' => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                current.push(' ');
            }
            ';' => push_statement(&mut statements, &mut current),
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &mut current);

    statements
}

/// MySQL only treats `--` as a comment when whitespace or the end of input
/// follows it. `chars` is positioned just after the first `-`.
fn starts_line_comment(chars: &std::iter::Peekable<std::str::Chars<'_>>) -> bool {
    let mut ahead = chars.clone();
    ahead.next() == Some('-') && ahead.next().is_none_or(char::is_whitespace)
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}
