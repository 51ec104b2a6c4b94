//! Executable statements.

use sea_query::Value;
use std::fmt;

/// SQL text with named `:param` placeholders and their values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    /// Placeholder name (with its leading `:`) → bound value
    pub params: Vec<(String, Value)>,
}

impl Statement {
    pub fn new(sql: String, params: Vec<(String, Value)>) -> Self {
        Self { sql, params }
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Rewrite named placeholders as Postgres `$n` placeholders.
    ///
    /// Returns the rewritten SQL and the values in placeholder order. A name
    /// used twice maps to the same `$n`. Quoted literals, quoted identifiers
    /// and `::type` casts are left alone, as are names with no bound value.
    pub fn to_positional(&self) -> (String, Vec<Value>) {
        let chars: Vec<char> = self.sql.chars().collect();
        let mut sql = String::with_capacity(self.sql.len());
        let mut order: Vec<String> = Vec::new();
        let mut values = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' | '"' => {
                    sql.push(c);
                    i += 1;
                    while i < chars.len() {
                        sql.push(chars[i]);
                        if chars[i] == c {
                            // doubled quote is an escape
                            if i + 1 < chars.len() && chars[i + 1] == c {
                                sql.push(c);
                                i += 2;
                                continue;
                            }
                            i += 1;
                            break;
                        }
                        i += 1;
                    }
                }
                ':' if i + 1 < chars.len() && chars[i + 1] == ':' => {
                    sql.push_str("::");
                    i += 2;
                }
                ':' if i + 1 < chars.len() && (chars[i + 1].is_alphabetic() || chars[i + 1] == '_') => {
                    let start = i;
                    i += 1;
                    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                        i += 1;
                    }
                    let name: String = chars[start..i].iter().collect();
                    match order.iter().position(|n| *n == name) {
                        Some(pos) => sql.push_str(&format!("${}", pos + 1)),
                        None => match self.param(&name) {
                            Some(value) => {
                                order.push(name);
                                values.push(value.clone());
                                sql.push_str(&format!("${}", order.len()));
                            }
                            None => {
                                log::warn!("no value bound for placeholder {name}");
                                sql.push_str(&name);
                            }
                        },
                    }
                }
                _ => {
                    sql.push(c);
                    i += 1;
                }
            }
        }

        (sql, values)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}
