//! Token types produced by the lexer (§4.1).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    String(String),
    Number(i64),

    Colon,
    Comma,
    Equals,
    LParen,
    RParen,
    Dollar,

    Newline,
    Indent,
    Dedent,
    Eof,
    Comment,

    // Keywords
    Var,
    Task,
    Profile,
    Include,
    Deps,
    Run,
    Env,
    Watch,
    Matrix,
    Docker,
    Remote,
    Desc,
    Parallel,
    If,
    Cache,
    Inputs,
    Outputs,
    Ignore,
    ProfileTask,
    Secrets,
    Pre,
    Retries,
    RetryDelay,
    Timeout,
    Prompt,
    Notify,
    Shell,
    Template,
    Group,
    Before,
    After,
    Alias,
    Extends,

    /// Unrecognized byte sequence; rejected by the parser (§4.1 Failure).
    Illegal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    /// Column of the first byte, 0-based, used for command-parsing
    /// adjacency reconstruction (§4.2).
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, col: usize) -> Self {
        Token { kind, line, col }
    }
}

pub fn keyword(ident: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match ident {
        "var" => Var,
        "task" => Task,
        "profile" => Profile,
        "include" => Include,
        "deps" => Deps,
        "run" => Run,
        "env" => Env,
        "watch" => Watch,
        "matrix" => Matrix,
        "docker" => Docker,
        "remote" => Remote,
        "desc" => Desc,
        "parallel" => Parallel,
        "if" => If,
        "cache" => Cache,
        "inputs" => Inputs,
        "outputs" => Outputs,
        "ignore" => Ignore,
        "watch_ignore" => Ignore,
        "profile_task" => ProfileTask,
        "secrets" => Secrets,
        "pre" => Pre,
        "retries" => Retries,
        "retry_delay" => RetryDelay,
        "timeout" => Timeout,
        "prompt" => Prompt,
        "notify" => Notify,
        "shell" => Shell,
        "template" => Template,
        "group" => Group,
        "before" => Before,
        "after" => After,
        "alias" => Alias,
        "extends" => Extends,
        _ => return None,
    })
}
