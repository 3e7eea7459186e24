//! Tokenizer for the control language.
//!
//! Produces `Indent`/`Dedent` tokens from leading whitespace and suppresses
//! newlines inside brackets, the way Python does.

use super::error::{ErrorKind, ScriptError};

/// Tab stops used when measuring indentation.
const TAB_WIDTH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(Op),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A token with the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Tokenize `source`, numbering lines from `first_line`.
pub fn tokenize(source: &str, first_line: usize) -> Result<Vec<Spanned>, ScriptError> {
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut depth: usize = 0;
    let mut line = first_line;

    for (offset, raw) in source.lines().enumerate() {
        line = first_line + offset;
        let chars: Vec<char> = raw.chars().collect();
        let mut pos = 0;

        if depth == 0 {
            let mut width = 0;
            while pos < chars.len() && (chars[pos] == ' ' || chars[pos] == '\t') {
                width = if chars[pos] == '\t' {
                    (width / TAB_WIDTH + 1) * TAB_WIDTH
                } else {
                    width + 1
                };
                pos += 1;
            }

            // Blank and comment-only lines carry no indentation meaning.
            if pos == chars.len() || chars[pos] == '#' || chars[pos] == '\r' {
                continue;
            }

            let current = indents.last().copied().unwrap_or(0);
            if width > current {
                indents.push(width);
                tokens.push(Spanned {
                    token: Token::Indent,
                    line,
                });
            } else if width < current {
                while indents.last().is_some_and(|&top| top > width) {
                    indents.pop();
                    tokens.push(Spanned {
                        token: Token::Dedent,
                        line,
                    });
                }
                if indents.last() != Some(&width) {
                    return Err(ScriptError::new(
                        line,
                        ErrorKind::Indentation,
                        "unindent does not match any outer indentation level",
                    ));
                }
            }
        }

        while pos < chars.len() {
            let c = chars[pos];
            match c {
                ' ' | '\t' | '\r' => pos += 1,
                '#' => break,
                '0'..='9' => {
                    let (token, next) = lex_number(&chars, pos, line)?;
                    tokens.push(Spanned { token, line });
                    pos = next;
                }
                '.' if chars.get(pos + 1).is_some_and(char::is_ascii_digit) => {
                    let (token, next) = lex_number(&chars, pos, line)?;
                    tokens.push(Spanned { token, line });
                    pos = next;
                }
                '"' | '\'' => {
                    let (text, next) = lex_string(&chars, pos, line)?;
                    // Adjacent literals concatenate.
                    if let Some(Spanned {
                        token: Token::Str(previous),
                        ..
                    }) = tokens.last_mut()
                    {
                        previous.push_str(&text);
                    } else {
                        tokens.push(Spanned {
                            token: Token::Str(text),
                            line,
                        });
                    }
                    pos = next;
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = pos;
                    while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                        pos += 1;
                    }
                    tokens.push(Spanned {
                        token: Token::Name(chars[start..pos].iter().collect()),
                        line,
                    });
                }
                _ => {
                    let (op, width) = lex_op(&chars, pos).ok_or_else(|| {
                        ScriptError::new(line, ErrorKind::Syntax, format!("invalid character '{c}'"))
                    })?;
                    match op {
                        Op::LParen | Op::LBracket => depth += 1,
                        Op::RParen | Op::RBracket => {
                            depth = depth.checked_sub(1).ok_or_else(|| {
                                ScriptError::new(line, ErrorKind::Syntax, "unmatched closing bracket")
                            })?;
                        }
                        _ => {}
                    }
                    tokens.push(Spanned {
                        token: Token::Op(op),
                        line,
                    });
                    pos += width;
                }
            }
        }

        let ends_statement = !matches!(
            tokens.last(),
            None | Some(Spanned {
                token: Token::Newline | Token::Indent | Token::Dedent,
                ..
            })
        );
        if depth == 0 && ends_statement {
            tokens.push(Spanned {
                token: Token::Newline,
                line,
            });
        }
    }

    if depth > 0 {
        return Err(ScriptError::new(
            line,
            ErrorKind::Syntax,
            "unexpected end of input: unclosed bracket",
        ));
    }

    while indents.len() > 1 {
        indents.pop();
        tokens.push(Spanned {
            token: Token::Dedent,
            line,
        });
    }
    tokens.push(Spanned {
        token: Token::Eof,
        line,
    });

    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize, line: usize) -> Result<(Token, usize), ScriptError> {
    let mut pos = start;
    let mut is_float = false;

    while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '_') {
        pos += 1;
    }
    if pos < chars.len() && chars[pos] == '.' && !chars.get(pos + 1).is_some_and(|c| c.is_alphabetic() || *c == '_') {
        is_float = true;
        pos += 1;
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
        let mut ahead = pos + 1;
        if ahead < chars.len() && (chars[ahead] == '+' || chars[ahead] == '-') {
            ahead += 1;
        }
        if ahead < chars.len() && chars[ahead].is_ascii_digit() {
            is_float = true;
            pos = ahead;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text: String = chars[start..pos].iter().filter(|c| **c != '_').collect();
    let token = if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ScriptError::new(line, ErrorKind::Syntax, format!("invalid number '{text}'")))?
    } else {
        text.parse::<i64>().map(Token::Int).map_err(|_| {
            ScriptError::new(line, ErrorKind::Overflow, format!("integer literal too large: {text}"))
        })?
    };

    Ok((token, pos))
}

fn lex_string(chars: &[char], start: usize, line: usize) -> Result<(String, usize), ScriptError> {
    let quote = chars[start];
    let mut pos = start + 1;
    let mut text = String::new();

    while pos < chars.len() {
        match chars[pos] {
            c if c == quote => return Ok((text, pos + 1)),
            '\\' if pos + 1 < chars.len() => {
                let escaped = match chars[pos + 1] {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                };
                text.push(escaped);
                pos += 2;
            }
            c => {
                text.push(c);
                pos += 1;
            }
        }
    }

    Err(ScriptError::new(
        line,
        ErrorKind::Syntax,
        "unterminated string literal",
    ))
}

fn lex_op(chars: &[char], pos: usize) -> Option<(Op, usize)> {
    let next = chars.get(pos + 1).copied();
    let double = match (chars[pos], next) {
        ('*', Some('*')) => Some(Op::DoubleStar),
        ('/', Some('/')) => Some(Op::DoubleSlash),
        ('=', Some('=')) => Some(Op::Eq),
        ('!', Some('=')) => Some(Op::Ne),
        ('<', Some('=')) => Some(Op::Le),
        ('>', Some('=')) => Some(Op::Ge),
        ('+', Some('=')) => Some(Op::PlusAssign),
        ('-', Some('=')) => Some(Op::MinusAssign),
        ('*', Some('=')) => Some(Op::StarAssign),
        ('/', Some('=')) => Some(Op::SlashAssign),
        _ => None,
    };
    if let Some(op) = double {
        return Some((op, 2));
    }

    let single = match chars[pos] {
        '(' => Op::LParen,
        ')' => Op::RParen,
        '[' => Op::LBracket,
        ']' => Op::RBracket,
        ',' => Op::Comma,
        ':' => Op::Colon,
        '.' => Op::Dot,
        '=' => Op::Assign,
        '+' => Op::Plus,
        '-' => Op::Minus,
        '*' => Op::Star,
        '/' => Op::Slash,
        '%' => Op::Percent,
        '<' => Op::Lt,
        '>' => Op::Gt,
        _ => return None,
    };
    Some((single, 1))
}
