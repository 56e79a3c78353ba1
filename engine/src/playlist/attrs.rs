//! Attribute-list parsing shared by master and media playlist tags (§4.2):
//! a comma-separated `KEY=VALUE` list where values may be double-quoted
//! (commas inside quotes do not split); surrounding quotes are stripped
//! after parsing.

use std::collections::HashMap;

pub type Attributes = HashMap<String, String>;

pub fn parse_attributes(raw: &str) -> Attributes {
    let mut map = HashMap::new();
    for chunk in split_respecting_quotes(raw) {
        let Some(eq_idx) = chunk.find('=') else {
            continue;
        };
        let key = chunk[..eq_idx].trim().to_string();
        let mut value = chunk[eq_idx + 1..].trim().to_string();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = value[1..value.len() - 1].to_string();
        }
        if !key.is_empty() {
            map.insert(key, value);
        }
    }
    map
}

fn split_respecting_quotes(raw: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                chunks.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
