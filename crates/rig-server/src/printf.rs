//! `printf` demo function: printf-style formatting of string arguments.
//!
//! Supported verbs are `%s`, `%v`, `%d`, `%q` and `%%`. Mistakes are rendered
//! inline rather than failing the call:
//!
//! - a verb without an argument becomes `%!s(MISSING)`
//! - a `%d` argument that is not an integer becomes `%!d(string=abc)`
//! - an unknown verb becomes `%!x(string=abc)`
//! - surplus arguments are appended as `%!(EXTRA string=a, string=b)`

use serde::{Deserialize, Serialize};

/// Input of `printf`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintfRequest {
    pub msg: String,
    #[serde(default)]
    pub info: Vec<String>,
}

/// Output of `printf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintfResponse {
    pub str: String,
}

pub fn call(request: &PrintfRequest) -> PrintfResponse {
    PrintfResponse {
        str: format(&request.msg, &request.info),
    }
}

/// Format `msg`, consuming `args` in order.
pub fn format(msg: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(msg.len());
    let mut args = args.iter();
    let mut chars = msg.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.next() else {
            out.push_str(&format!("%!{verb}(MISSING)"));
            continue;
        };
        match verb {
            's' | 'v' => out.push_str(arg),
            'q' => out.push_str(&format!("{arg:?}")),
            'd' => match arg.trim().parse::<i64>() {
                Ok(n) => out.push_str(&n.to_string()),
                Err(_) => out.push_str(&format!("%!d(string={arg})")),
            },
            other => out.push_str(&format!("%!{other}(string={arg})")),
        }
    }

    let extra: Vec<String> = args.map(|arg| format!("string={arg}")).collect();
    if !extra.is_empty() {
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_hello_world() {
        let request = PrintfRequest {
            msg: "Hello, %s!".into(),
            info: args(&["world"]),
        };
        assert_eq!(call(&request).str, "Hello, world!");
    }

    #[test]
    fn test_verbs() {
        assert_eq!(format("%v and %d", &args(&["x", "42"])), "x and 42");
        assert_eq!(format("%q", &args(&["a\"b"])), r#""a\"b""#);
        assert_eq!(format("100%%", &[]), "100%");
    }

    #[test]
    fn test_missing_and_extra() {
        assert_eq!(format("%s %s", &args(&["a"])), "a %!s(MISSING)");
        assert_eq!(
            format("%s", &args(&["a", "b", "c"])),
            "a%!(EXTRA string=b, string=c)"
        );
    }

    #[test]
    fn test_bad_arguments() {
        assert_eq!(format("%d", &args(&["abc"])), "%!d(string=abc)");
        assert_eq!(format("%x", &args(&["abc"])), "%!x(string=abc)");
        assert_eq!(format("trailing %", &[]), "trailing %!(NOVERB)");
    }

    #[test]
    fn test_unicode_passthrough() {
        assert_eq!(format("héllo %s ✓", &args(&["wörld"])), "héllo wörld ✓");
    }
}
