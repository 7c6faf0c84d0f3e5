//! Restricted `${...}` template rendering.
//!
//! Templates come from user configuration, so expressions are interpreted by
//! a closed grammar: ternary, `&&`, `+` concatenation, string and number
//! literals, dotted property lookups and a fixed set of read-only string
//! methods. Anything else renders as an empty string.

use serde_json::{Map, Number, Value};

/// Upper bound, in characters, on strings built by `padStart`, `padEnd` and
/// `repeat`. Larger requests render as empty.
const MAX_RENDERED_LEN: usize = 1024;

const ALLOWED_METHODS: &[&str] = &[
    "substring",
    "slice",
    "toLowerCase",
    "toUpperCase",
    "toLocaleLowerCase",
    "toLocaleUpperCase",
    "trim",
    "trimStart",
    "trimEnd",
    "replace",
    "split",
    "indexOf",
    "lastIndexOf",
    "startsWith",
    "endsWith",
    "includes",
    "charAt",
    "padStart",
    "padEnd",
    "repeat",
    "toString",
];

/// Replace every `${expression}` placeholder in `template`.
pub fn render(template: &str, vars: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        match closing_brace(body) {
            Some(end) => {
                out.push_str(&to_text(&evaluate(&body[..end], vars)));
                rest = &body[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Build a variable scope from named values.
pub fn scope<I, K>(entries: I) -> Value
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let map: Map<String, Value> = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
    Value::Object(map)
}

fn closing_brace(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' || c == '`' => quote = Some(c),
            None if c == '}' => return Some(i),
            None => {}
        }
    }
    None
}

/// Byte offsets of characters outside quotes and parentheses.
fn top_level(expr: &str) -> Vec<(usize, char)> {
    let mut positions = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;

    for (i, c) in expr.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => {
                if depth == 0 {
                    positions.push((i, c));
                }
                depth += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    positions.push((i, c));
                }
            }
            _ if depth == 0 => positions.push((i, c)),
            _ => {}
        }
    }
    positions
}

fn evaluate(expr: &str, vars: &Value) -> Value {
    let expr = expr.trim();
    if expr.is_empty() {
        return Value::Null;
    }
    let positions = top_level(expr);

    if let Some((question, colon)) = ternary_split(expr, &positions) {
        let condition = evaluate(&expr[..question], vars);
        return if truthy(&condition) {
            evaluate(&expr[question + 1..colon], vars)
        } else {
            evaluate(&expr[colon + 1..], vars)
        };
    }

    if let Some(and) = positions
        .windows(2)
        .find(|w| w[0].1 == '&' && w[1].1 == '&' && w[1].0 == w[0].0 + 1)
        .map(|w| w[0].0)
    {
        let left = evaluate(&expr[..and], vars);
        if !truthy(&left) {
            return left;
        }
        return evaluate(&expr[and + 2..], vars);
    }

    let plus: Vec<usize> = positions
        .iter()
        .filter(|(_, c)| *c == '+')
        .map(|(i, _)| *i)
        .collect();
    if !plus.is_empty() {
        let mut out = String::new();
        let mut start = 0;
        for i in plus.into_iter().chain(std::iter::once(expr.len())) {
            out.push_str(&to_text(&evaluate(&expr[start..i], vars)));
            start = i + 1;
        }
        return Value::String(out);
    }

    primary(expr, &positions, vars)
}

/// Top-level `?` and its matching `:`, skipping `?.` and nested ternaries.
fn ternary_split(expr: &str, positions: &[(usize, char)]) -> Option<(usize, usize)> {
    let bytes = expr.as_bytes();
    let question = positions
        .iter()
        .find(|(i, c)| *c == '?' && bytes.get(i + 1) != Some(&b'.'))
        .map(|(i, _)| *i)?;

    let mut nested = 0usize;
    for &(i, c) in positions.iter().filter(|(i, _)| *i > question) {
        match c {
            '?' if bytes.get(i + 1) != Some(&b'.') => nested += 1,
            ':' if nested == 0 => return Some((question, i)),
            ':' => nested -= 1,
            _ => {}
        }
    }
    None
}

fn primary(expr: &str, positions: &[(usize, char)], vars: &Value) -> Value {
    if let Some(text) = string_literal(expr) {
        return Value::String(text);
    }
    if let Ok(n) = expr.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = expr.parse::<f64>() {
        return Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null);
    }

    if expr.ends_with(')') {
        let Some(open) = positions.iter().find(|(_, c)| *c == '(').map(|(i, _)| *i) else {
            return Value::Null;
        };
        let close = expr.len() - 1;
        if !positions.iter().any(|&(i, c)| c == ')' && i == close) {
            return Value::Null;
        }
        return call(&expr[..open], &expr[open + 1..close], vars);
    }

    lookup(expr, vars)
}

fn string_literal(expr: &str) -> Option<String> {
    let quote = expr.chars().next().filter(|c| matches!(c, '\'' | '"' | '`'))?;
    if expr.len() < 2 || !expr.ends_with(quote) {
        return None;
    }
    let inner = &expr[1..expr.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == quote {
            return None;
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            other => out.push(other),
        }
    }
    Some(out)
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Dotted lookup; any nullish segment makes the whole path null.
fn lookup(path: &str, vars: &Value) -> Value {
    let path = path.replace("?.", ".");
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    if !segments.iter().all(|s| is_identifier(s)) {
        return Value::Null;
    }

    let last = segments.len() - 1;
    let mut current = vars;
    for (index, segment) in segments.into_iter().enumerate() {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(value) if !value.is_null() => current = value,
                _ => return Value::Null,
            },
            Value::Array(items) if segment == "length" && index == last => {
                return Value::from(items.len())
            }
            Value::String(s) if segment == "length" && index == last => {
                return Value::from(s.chars().count())
            }
            _ => return Value::Null,
        }
    }
    current.clone()
}

fn call(callee: &str, args: &str, vars: &Value) -> Value {
    let Some((path, method)) = callee.trim().rsplit_once('.') else {
        return Value::Null;
    };
    let method = method.trim();
    if !ALLOWED_METHODS.contains(&method) {
        return Value::Null;
    }
    let receiver = lookup(path, vars);
    if receiver.is_null() {
        return Value::Null;
    }
    let args: Vec<Value> = split_args(args)
        .into_iter()
        .map(|arg| evaluate(arg, vars))
        .collect();
    apply(method, &to_text(&receiver), &args)
}

fn split_args(args: &str) -> Vec<&str> {
    if args.trim().is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in top_level(args) {
        if c == ',' {
            parts.push(&args[start..i]);
            start = i + 1;
        }
    }
    parts.push(&args[start..]);
    parts
}

fn apply(method: &str, s: &str, args: &[Value]) -> Value {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let text_arg = |i: usize| args.get(i).map(to_text).unwrap_or_default();
    let int_arg = |i: usize| args.get(i).and_then(to_int);
    let slice_of = |from: i64, to: i64| -> Value {
        let (from, to) = (from.clamp(0, len) as usize, to.clamp(0, len) as usize);
        if from >= to {
            return Value::String(String::new());
        }
        Value::String(chars[from..to].iter().collect())
    };

    match method {
        "substring" => {
            let a = int_arg(0).unwrap_or(0).clamp(0, len);
            let b = int_arg(1).unwrap_or(len).clamp(0, len);
            slice_of(a.min(b), a.max(b))
        }
        "slice" => {
            let relative = |v: i64| if v < 0 { len.saturating_add(v) } else { v };
            let a = relative(int_arg(0).unwrap_or(0));
            let b = relative(int_arg(1).unwrap_or(len));
            slice_of(a, b)
        }
        "toLowerCase" | "toLocaleLowerCase" => Value::String(s.to_lowercase()),
        "toUpperCase" | "toLocaleUpperCase" => Value::String(s.to_uppercase()),
        "trim" => Value::String(s.trim().to_string()),
        "trimStart" => Value::String(s.trim_start().to_string()),
        "trimEnd" => Value::String(s.trim_end().to_string()),
        "replace" => Value::String(s.replacen(&text_arg(0), &text_arg(1), 1)),
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None => vec![Value::String(s.to_string())],
                Some(sep) => {
                    let sep = to_text(sep);
                    if sep.is_empty() {
                        chars.iter().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()
                    }
                }
            };
            let limit = int_arg(1).map(|n| n.max(0) as usize).unwrap_or(parts.len());
            Value::Array(parts.into_iter().take(limit).collect())
        }
        "indexOf" => {
            let from = int_arg(1).unwrap_or(0).clamp(0, len) as usize;
            Value::from(char_index(&chars, &text_arg(0), from, false))
        }
        "lastIndexOf" => Value::from(char_index(&chars, &text_arg(0), 0, true)),
        "startsWith" => Value::Bool(s.starts_with(&text_arg(0))),
        "endsWith" => Value::Bool(s.ends_with(&text_arg(0))),
        "includes" => Value::Bool(s.contains(&text_arg(0))),
        "charAt" => {
            let i = int_arg(0).unwrap_or(0);
            slice_of(i, i.saturating_add(1))
        }
        "padStart" | "padEnd" => {
            let target = int_arg(0).unwrap_or(0).max(0) as usize;
            if target > MAX_RENDERED_LEN {
                return Value::Null;
            }
            let fill = args.get(1).map(to_text).unwrap_or_else(|| " ".to_string());
            if target <= chars.len() || fill.is_empty() {
                return Value::String(s.to_string());
            }
            let padding: String = fill.chars().cycle().take(target - chars.len()).collect();
            if method == "padStart" {
                Value::String(padding + s)
            } else {
                Value::String(s.to_string() + &padding)
            }
        }
        "repeat" => match int_arg(0) {
            Some(n) if n >= 0 && (n as usize).saturating_mul(chars.len()) <= MAX_RENDERED_LEN => {
                Value::String(s.repeat(n as usize))
            }
            _ => Value::Null,
        },
        "toString" => Value::String(s.to_string()),
        _ => Value::Null,
    }
}

/// Character (not byte) position of `needle`, or -1.
fn char_index(haystack: &[char], needle: &str, from: usize, last: bool) -> i64 {
    let needle: Vec<char> = needle.chars().collect();
    if needle.len() > haystack.len() {
        return -1;
    }
    let mut starts = (from..=haystack.len() - needle.len())
        .filter(|&i| haystack[i..i + needle.len()] == needle[..]);
    let found = if last { starts.last() } else { starts.next() };
    found.map(|i| i as i64).unwrap_or(-1)
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(to_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Value {
        json!({
            "container": {
                "name": "nginx",
                "image": {"tag": {"value": "1.25.3"}},
                "updateKind": {"kind": "tag", "localValue": "1.25.3", "remoteValue": "1.27.0"},
                "result": {"link": null},
                "flag": false
            },
            "containers": [1, 2, 3]
        })
    }

    #[test]
    fn test_property_paths() {
        assert_eq!(
            render("New ${container.updateKind.kind} found for ${container.name}", &vars()),
            "New tag found for nginx"
        );
        assert_eq!(render("${containers.length} updates", &vars()), "3 updates");
        assert_eq!(render("[${container.missing.deep}]", &vars()), "[]");
        assert_eq!(render("[${container.result?.link}]", &vars()), "[]");
    }

    #[test]
    fn test_and_short_circuits() {
        assert_eq!(render("${container.name && 'yes'}", &vars()), "yes");
        assert_eq!(render("${container.flag && 'yes'}", &vars()), "false");
        assert_eq!(render("${container.result.link && 'yes'}", &vars()), "");
    }

    #[test]
    fn test_ternary_and_concat() {
        assert_eq!(
            render(r#"${container.result.link ? "\n" + container.result.link : "none"}"#, &vars()),
            "none"
        );
        assert_eq!(
            render("${container.name ? container.name + ':' + container.image.tag.value : ''}", &vars()),
            "nginx:1.25.3"
        );
        assert_eq!(render("${container.flag ? 'a' : container.name ? 'b' : 'c'}", &vars()), "b");
    }

    #[test]
    fn test_quoted_operators_are_literal() {
        assert_eq!(render("${'a + b ? c : d'}", &vars()), "a + b ? c : d");
        assert_eq!(render("${'}'}", &vars()), "}");
    }

    #[test]
    fn test_allowed_methods() {
        assert_eq!(render("${container.name.toUpperCase()}", &vars()), "NGINX");
        assert_eq!(render("${container.name.substring(0, 2)}", &vars()), "ng");
        assert_eq!(render("${container.name.slice(-3)}", &vars()), "inx");
        assert_eq!(render("${container.image.tag.value.split('.')}", &vars()), "1,25,3");
        assert_eq!(render("${container.name.replace('n', 'N')}", &vars()), "Nginx");
        assert_eq!(render("${container.name.indexOf('x')}", &vars()), "4");
        assert_eq!(render("${container.name.padStart(7, '*')}", &vars()), "**nginx");
        assert_eq!(render("${container.name.startsWith('ng')}", &vars()), "true");
        assert_eq!(render("${container.name.charAt(1)}", &vars()), "g");
        assert_eq!(render("${container.name.repeat(2)}", &vars()), "nginxnginx");
    }

    #[test]
    fn test_oversized_padding_and_repeat_render_empty() {
        assert_eq!(render("${container.name.padStart(100000000000, 'x')}", &vars()), "");
        assert_eq!(render("${container.name.padEnd(1025, 'x')}", &vars()), "");
        assert_eq!(render("${container.name.repeat(300)}", &vars()), "");
        let padded = render("${container.name.padEnd(1024, '.')}", &vars());
        assert_eq!(padded.len(), 1024);
        assert!(padded.starts_with("nginx."));
    }

    #[test]
    fn test_extreme_indices_do_not_overflow() {
        assert_eq!(render("${container.name.charAt(9223372036854775807)}", &vars()), "");
        assert_eq!(render("${container.name.charAt(-1)}", &vars()), "");
        assert_eq!(render("${container.name.slice(-9223372036854775808)}", &vars()), "nginx");
        assert_eq!(
            render("${container.name.substring(0, 9223372036854775807)}", &vars()),
            "nginx"
        );
    }

    #[test]
    fn test_disallowed_syntax_is_empty() {
        assert_eq!(render("${container.name.constructor('x')}", &vars()), "");
        assert_eq!(render("${process.exit(1)}", &vars()), "");
        assert_eq!(render("${container['name']}", &vars()), "");
        assert_eq!(render("${1 - 1}", &vars()), "");
        assert_eq!(render("${}", &vars()), "");
    }

    #[test]
    fn test_literals_and_unterminated() {
        assert_eq!(render("${42}/${'x'}", &vars()), "42/x");
        assert_eq!(render("keep ${container.name", &vars()), "keep ${container.name");
        assert_eq!(render("no placeholders", &vars()), "no placeholders");
    }
}
