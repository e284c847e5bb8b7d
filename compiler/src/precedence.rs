//! Shared operator precedence table.
//!
//! Kept as data (punctuator text -> (precedence, right-associative)) rather
//! than control flow, per spec.md §9 "Pratt precedence table": this one
//! table drives both the main expression parser (`parser::expr`) and the
//! `#if`/`#elif` constant-expression evaluator (`preprocessor::condexpr`),
//! mirroring how `examples/original_source/src/preprocessor/directives.c`
//! shares `precedence.h` between the two.

/// Binding power for a binary infix operator. Higher binds tighter.
/// Matches C11 §6.5's precedence levels (comma lowest, postfix highest;
/// only the levels reachable from a binary-operator position are listed
/// here - unary/postfix/primary parsing is handled separately by each
/// caller).
pub fn infix_binding_power(punct: &str) -> Option<(u8, bool)> {
    let (prec, right_assoc) = match punct {
        "," => (1, false),
        "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>=" => (2, true),
        "?" => (3, true),
        "||" => (4, false),
        "&&" => (5, false),
        "|" => (6, false),
        "^" => (7, false),
        "&" => (8, false),
        "==" | "!=" => (9, false),
        "<" | ">" | "<=" | ">=" => (10, false),
        "<<" | ">>" => (11, false),
        "+" | "-" => (12, false),
        "*" | "/" | "%" => (13, false),
        _ => return None,
    };
    Some((prec, right_assoc))
}

/// Precedence used when parsing a unary prefix operator's operand (spec.md
/// §4.1's `PREFIX_PREC`): binds tighter than every binary operator so
/// `-a + b` parses as `(-a) + b`.
pub const PREFIX_PREC: u8 = 14;

pub fn is_unary_prefix(punct: &str) -> bool {
    matches!(punct, "+" | "-" | "!" | "~" | "*" | "&")
}
