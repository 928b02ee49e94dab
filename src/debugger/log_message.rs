//! Log-action message templates.
//!
//! A log action's text may embed `${expression}` placeholders. Targets only
//! understand plain log strings, so templated messages are rewritten into an
//! evaluate action that calls `console.log` with a template literal.

use std::sync::OnceLock;

use regex::Regex;

static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();

/// Token kind produced by [`tokenize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    PlainText,
    Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token_type: TokenType,
    pub data: String,
}

impl Token {
    fn plain(data: String) -> Self {
        Self { token_type: TokenType::PlainText, data }
    }

    fn expression(data: String) -> Self {
        Self { token_type: TokenType::Expression, data }
    }
}

/// Whether `text` contains at least one `${...}` placeholder
pub fn has_template_placeholder(text: &str) -> bool {
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$\{.*?\}").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}

/// Split a message into plain text and expression tokens.
///
/// Braces inside an expression nest, and quoted strings inside an expression
/// may contain braces. Returns `None` for an unterminated or empty expression.
pub fn tokenize(input: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            if !buffer.is_empty() {
                tokens.push(Token::plain(std::mem::take(&mut buffer)));
            }

            let expression = read_expression(&mut chars)?;
            if expression.trim().is_empty() {
                return None;
            }
            tokens.push(Token::expression(expression));
            continue;
        }

        buffer.push(c);
    }

    if !buffer.is_empty() {
        tokens.push(Token::plain(buffer));
    }

    Some(tokens)
}

fn read_expression(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut expression = String::new();
    let mut depth = 1usize;
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(open) = quote {
            expression.push(c);
            if c == '\\' {
                expression.push(chars.next()?);
            } else if c == open {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(expression);
                }
            }
            _ => {}
        }

        expression.push(c);
    }

    None
}

/// Rewrite a templated log message into a `console.log` template literal call.
///
/// Returns `None` when the template is malformed.
pub fn compile_log_template(message: &str) -> Option<String> {
    let tokens = tokenize(message)?;

    let mut literal = String::new();
    for token in tokens {
        match token.token_type {
            TokenType::PlainText => {
                for c in token.data.chars() {
                    if c == '`' || c == '\\' {
                        literal.push('\\');
                    }
                    literal.push(c);
                }
            }
            TokenType::Expression => {
                literal.push_str("${");
                literal.push_str(&token.data);
                literal.push('}');
            }
        }
    }

    Some(format!("console.log(`{}`)", literal))
}
