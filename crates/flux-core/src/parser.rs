//! Token stream → [`FluxFile`] (§4.2).
//!
//! Command bodies (`run`/`before`/`after`) are reconstructed from the raw
//! source line rather than by re-joining token text: the lexer already
//! discards nothing but comments and layout on a command line, so slicing
//! the trimmed source line reproduces the "column-adjacency" spacing rule
//! exactly without hand-rolling a token-gap heuristic.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    lines: Vec<&'a str>,
    pos: usize,
    errors: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Parser {
            tokens: Lexer::tokenize(source),
            lines: source.lines().collect(),
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn line_text(&self, line: usize) -> &'a str {
        self.lines.get(line.saturating_sub(1)).copied().unwrap_or("").trim()
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_tok(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn error(&mut self, msg: impl Into<String>) {
        let line = self.peek_tok().line;
        self.errors.push(format!("line {line}: {}", msg.into()));
    }

    fn expect(&mut self, kind: &TokenKind) -> bool {
        if std::mem::discriminant(self.peek()) == std::mem::discriminant(kind) {
            self.advance();
            true
        } else {
            self.error(format!("expected {kind:?}, found {:?}", self.peek()));
            false
        }
    }

    /// Parses a whole Flux source file, resolving `include`s relative to
    /// `base_dir` (§4.2 Include resolution).
    pub fn parse_file(source: &str, base_dir: &Path) -> Result<FluxFile, ParseError> {
        let mut seen = Vec::new();
        parse_with_includes(source, base_dir, &mut seen)
    }

    pub fn parse(&mut self) -> Result<FluxFile, ParseError> {
        let mut file = FluxFile::new();
        self.skip_newlines();
        while !self.at_eof() {
            match self.peek().clone() {
                TokenKind::Var => self.parse_var(&mut file),
                TokenKind::Task => self.parse_task(&mut file),
                TokenKind::Profile => self.parse_profile(&mut file),
                TokenKind::Template => self.parse_template(&mut file),
                TokenKind::Group => self.parse_group(&mut file),
                TokenKind::Include => self.parse_include(&mut file),
                TokenKind::Newline => {
                    self.advance();
                }
                _ => {
                    self.error(format!("unexpected top-level token {:?}", self.peek()));
                    self.advance();
                }
            }
            self.skip_newlines();
        }

        for name in file.aliases.keys() {
            if file.tasks.iter().any(|t| &t.name == name) {
                self.errors
                    .push(format!("alias '{name}' collides with a task name"));
            }
        }

        if self.errors.is_empty() {
            Ok(file)
        } else {
            Err(ParseError::Joined(self.errors.join("; ")))
        }
    }

    fn scalar_value(&mut self) -> String {
        match self.advance().kind {
            TokenKind::Ident(s) => s,
            TokenKind::String(s) => s,
            TokenKind::Number(n) => n.to_string(),
            TokenKind::Dollar => self.shell_expr_tail(),
            other => {
                self.error(format!("expected a scalar value, found {other:?}"));
                String::new()
            }
        }
    }

    /// Parses the remainder of `$(shell "cmd")` after the leading `$` and
    /// reserializes it literally so the variable engine can execute it at
    /// resolution time (§4.2 Shell substitution).
    fn shell_expr_tail(&mut self) -> String {
        if !self.expect(&TokenKind::LParen) {
            return String::new();
        }
        if !matches!(self.peek(), TokenKind::Shell) {
            self.error("expected 'shell' inside $(...)".to_string());
        } else {
            self.advance();
        }
        let cmd = match self.advance().kind {
            TokenKind::String(s) => s,
            other => {
                self.error(format!("expected a quoted command, found {other:?}"));
                String::new()
            }
        };
        self.expect(&TokenKind::RParen);
        format!("$(shell \"{cmd}\")")
    }

    /// Reads a directive value that is either a single quoted string or a
    /// bare sequence of identifiers joined by single spaces until the end
    /// of the line (§4.2; matches `desc: "a sentence"` and
    /// `desc: a bare sentence` forms).
    fn multi_word_value(&mut self) -> String {
        if let TokenKind::String(_) = self.peek() {
            return self.scalar_value();
        }
        let mut parts = Vec::new();
        while !matches!(self.peek(), TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof) {
            parts.push(self.scalar_value());
        }
        parts.join(" ")
    }

    /// Reads every remaining token on the current line, re-quoting strings
    /// and joining with single spaces — used for `if` conditions, which are
    /// a small multi-token expression rather than a single scalar (§4.7).
    fn rest_of_line_joined(&mut self) -> String {
        let mut parts = Vec::new();
        while !matches!(self.peek(), TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof) {
            let piece = match self.advance().kind {
                TokenKind::String(s) => format!("\"{s}\""),
                TokenKind::Ident(s) => s,
                TokenKind::Number(n) => n.to_string(),
                TokenKind::Colon => ":".to_string(),
                TokenKind::Comma => ",".to_string(),
                TokenKind::Equals => "=".to_string(),
                TokenKind::LParen => "(".to_string(),
                TokenKind::RParen => ")".to_string(),
                TokenKind::Dollar => "$".to_string(),
                TokenKind::Illegal(s) => s,
                other => format!("{other:?}"),
            };
            parts.push(piece);
        }
        parts.join(" ")
    }

    fn parse_var(&mut self, file: &mut FluxFile) {
        self.advance(); // var
        let name = match self.advance().kind {
            TokenKind::Ident(s) => s,
            other => {
                self.error(format!("expected variable name, found {other:?}"));
                return;
            }
        };
        self.expect(&TokenKind::Equals);
        let value = self.scalar_value();
        file.vars.insert(name, value);
    }

    fn parse_include(&mut self, file: &mut FluxFile) {
        self.advance(); // include
        match self.advance().kind {
            TokenKind::String(path) => file.includes.push(path),
            other => self.error(format!("expected include path string, found {other:?}")),
        }
    }

    /// Consumes `IDENT ":" NEWLINE INDENT ... DEDENT` and runs `body` once
    /// per directive line found inside the block.
    fn parse_block<F: FnMut(&mut Self, TokenKind)>(&mut self, mut body: F) {
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        if !matches!(self.peek(), TokenKind::Indent) {
            // Empty block, nothing indented beneath it.
            return;
        }
        self.advance();
        self.skip_newlines();
        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            let directive = self.advance().kind;
            body(self, directive);
            self.skip_newlines();
        }
        if matches!(self.peek(), TokenKind::Dedent) {
            self.advance();
        }
    }

    /// Reads a comma-separated inline list or an indented block of one
    /// item per line (§4.2 list directives).
    fn list_value(&mut self) -> Vec<String> {
        self.expect(&TokenKind::Colon);
        if matches!(self.peek(), TokenKind::Newline) {
            self.advance();
            if !matches!(self.peek(), TokenKind::Indent) {
                return Vec::new();
            }
            self.advance();
            self.skip_newlines();
            let mut items = Vec::new();
            while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
                items.push(self.scalar_value());
                while matches!(self.peek(), TokenKind::Comma) {
                    self.advance();
                    items.push(self.scalar_value());
                }
                self.skip_newlines();
            }
            if matches!(self.peek(), TokenKind::Dedent) {
                self.advance();
            }
            items
        } else {
            let mut items = vec![self.scalar_value()];
            while matches!(self.peek(), TokenKind::Comma) {
                self.advance();
                items.push(self.scalar_value());
            }
            items
        }
    }

    /// Reads an indented block of commands, one per source line,
    /// reconstructed by raw-line slicing (§4.2 Command parsing).
    fn command_block(&mut self) -> Vec<String> {
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        if !matches!(self.peek(), TokenKind::Indent) {
            return Vec::new();
        }
        self.advance();
        self.skip_newlines();
        let mut commands = Vec::new();
        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            let line = self.peek_tok().line;
            commands.push(self.line_text(line).to_string());
            while !matches!(self.peek(), TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof)
            {
                self.advance();
            }
            self.skip_newlines();
        }
        if matches!(self.peek(), TokenKind::Dedent) {
            self.advance();
        }
        commands
    }

    /// Reads an indented `key = value` block (§4.2 mapping directives,
    /// `env` form).
    fn env_block(&mut self) -> BTreeMap<String, String> {
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        let mut map = BTreeMap::new();
        if !matches!(self.peek(), TokenKind::Indent) {
            return map;
        }
        self.advance();
        self.skip_newlines();
        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            let key = match self.advance().kind {
                TokenKind::Ident(s) => s,
                other => {
                    self.error(format!("expected env key, found {other:?}"));
                    self.skip_newlines();
                    continue;
                }
            };
            self.expect(&TokenKind::Equals);
            let value = self.scalar_value();
            map.insert(key, value);
            self.skip_newlines();
        }
        if matches!(self.peek(), TokenKind::Dedent) {
            self.advance();
        }
        map
    }

    /// Reads an indented `key: v1, v2` block (§4.2 mapping directives,
    /// `matrix` form).
    fn matrix_block(&mut self) -> BTreeMap<String, Vec<String>> {
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        let mut map = BTreeMap::new();
        if !matches!(self.peek(), TokenKind::Indent) {
            return map;
        }
        self.advance();
        self.skip_newlines();
        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            let key = match self.advance().kind {
                TokenKind::Ident(s) => s,
                other => {
                    self.error(format!("expected matrix dimension name, found {other:?}"));
                    self.skip_newlines();
                    continue;
                }
            };
            let values = self.list_value();
            map.insert(key, values);
            self.skip_newlines();
        }
        if matches!(self.peek(), TokenKind::Dedent) {
            self.advance();
        }
        map
    }

    fn pre_block(&mut self) -> Vec<Precondition> {
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        let mut out = Vec::new();
        if !matches!(self.peek(), TokenKind::Indent) {
            return out;
        }
        self.advance();
        self.skip_newlines();
        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            let kind = match self.advance().kind {
                TokenKind::Ident(s) if s == "file" => PreconditionKind::File,
                TokenKind::Ident(s) if s == "command" => PreconditionKind::Command,
                TokenKind::Ident(s) if s == "env" => PreconditionKind::Env,
                TokenKind::Env => PreconditionKind::Env,
                other => {
                    self.error(format!("unknown precondition kind {other:?}"));
                    PreconditionKind::Unknown
                }
            };
            self.expect(&TokenKind::Colon);
            let value = self.scalar_value();
            out.push(Precondition { kind, value });
            self.skip_newlines();
        }
        if matches!(self.peek(), TokenKind::Dedent) {
            self.advance();
        }
        out
    }

    fn notify_block(&mut self) -> Notify {
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        let mut notify = Notify::default();
        if !matches!(self.peek(), TokenKind::Indent) {
            return notify;
        }
        self.advance();
        self.skip_newlines();
        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            match self.advance().kind {
                TokenKind::Ident(s) if s == "success" => {
                    self.expect(&TokenKind::Colon);
                    notify.success = Some(self.multi_word_value());
                }
                TokenKind::Ident(s) if s == "failure" => {
                    self.expect(&TokenKind::Colon);
                    notify.failure = Some(self.multi_word_value());
                }
                other => self.error(format!("unknown notify key {other:?}")),
            }
            self.skip_newlines();
        }
        if matches!(self.peek(), TokenKind::Dedent) {
            self.advance();
        }
        notify
    }

    fn parse_task(&mut self, file: &mut FluxFile) {
        self.advance(); // task
        let name = match self.advance().kind {
            TokenKind::Ident(s) => s,
            other => {
                self.error(format!("expected task name, found {other:?}"));
                return;
            }
        };
        let mut task = Task::new(name);
        self.parse_block(|p, directive| p.apply_task_directive(&mut task, directive));
        if let Some(alias) = &task.alias {
            if file.aliases.contains_key(alias) {
                self.errors.push(format!("duplicate alias '{alias}'"));
            } else {
                file.aliases.insert(alias.clone(), task.name.clone());
            }
        }
        file.tasks.push(task);
    }

    fn apply_task_directive(&mut self, task: &mut Task, directive: TokenKind) {
        use TokenKind::*;
        match directive {
            Desc => {
                self.expect(&Colon);
                task.desc = Some(self.multi_word_value());
            }
            Deps => task.deps = self.list_value(),
            Run => task.run = self.command_block(),
            Before => task.before = self.command_block(),
            After => task.after = self.command_block(),
            Env => task.env = self.env_block(),
            Watch => task.watch = self.list_value(),
            Ignore => task.watch_ignore = self.list_value(),
            Matrix => {
                let dims = self.matrix_block();
                if !dims.is_empty() {
                    task.matrix = Some(Matrix { dimensions: dims });
                }
            }
            Cache => {
                self.expect(&Colon);
                task.cache = self.scalar_value() == "true";
            }
            Inputs => task.inputs = self.list_value(),
            Outputs => task.outputs = self.list_value(),
            ProfileTask => {
                self.expect(&Colon);
                task.profile = Some(self.scalar_value());
            }
            Secrets => task.secrets = self.list_value(),
            Pre => task.pre = self.pre_block(),
            Retries => {
                self.expect(&Colon);
                task.retries = match self.advance().kind {
                    Number(n) => n,
                    Ident(s) => s.parse().unwrap_or(0),
                    _ => 0,
                };
            }
            RetryDelay => {
                self.expect(&Colon);
                task.retry_delay = Some(self.scalar_value());
            }
            Timeout => {
                self.expect(&Colon);
                task.timeout = Some(self.scalar_value());
            }
            Prompt => {
                self.expect(&Colon);
                task.prompt = Some(self.multi_word_value());
            }
            Notify => task.notify = self.notify_block(),
            Docker => {
                self.expect(&Colon);
                task.docker = self.scalar_value() == "true";
            }
            Remote => {
                self.expect(&Colon);
                task.remote = Some(self.scalar_value());
            }
            Parallel => {
                self.expect(&Colon);
                task.parallel = self.scalar_value() == "true";
            }
            If => {
                self.expect(&Colon);
                task.condition = Some(self.rest_of_line_joined());
            }
            Alias => {
                self.expect(&Colon);
                task.alias = Some(self.scalar_value());
            }
            Extends => {
                self.expect(&Colon);
                task.extends = Some(self.scalar_value());
            }
            other => {
                self.error(format!("unknown task directive {other:?}"));
                // Recovery: skip to end of this directive's value/block.
                if matches!(self.peek(), Colon) {
                    self.advance();
                }
            }
        }
    }

    fn parse_template(&mut self, file: &mut FluxFile) {
        self.advance(); // template
        let name = match self.advance().kind {
            TokenKind::Ident(s) => s,
            other => {
                self.error(format!("expected template name, found {other:?}"));
                return;
            }
        };
        let mut tmpl = Template {
            name,
            ..Default::default()
        };
        self.parse_block(|p, directive| p.apply_template_directive(&mut tmpl, directive));
        file.templates.push(tmpl);
    }

    fn apply_template_directive(&mut self, tmpl: &mut Template, directive: TokenKind) {
        use TokenKind::*;
        match directive {
            Desc => {
                self.expect(&Colon);
                tmpl.desc = Some(self.multi_word_value());
            }
            Deps => tmpl.deps = self.list_value(),
            Run => tmpl.run = self.command_block(),
            Before => tmpl.before = self.command_block(),
            After => tmpl.after = self.command_block(),
            Env => tmpl.env = self.env_block(),
            Cache => {
                self.expect(&Colon);
                tmpl.cache = self.scalar_value() == "true";
            }
            Inputs => tmpl.inputs = self.list_value(),
            Outputs => tmpl.outputs = self.list_value(),
            ProfileTask => {
                self.expect(&Colon);
                tmpl.profile = Some(self.scalar_value());
            }
            Secrets => tmpl.secrets = self.list_value(),
            Pre => tmpl.pre = self.pre_block(),
            Retries => {
                self.expect(&Colon);
                tmpl.retries = match self.advance().kind {
                    Number(n) => n,
                    Ident(s) => s.parse().unwrap_or(0),
                    _ => 0,
                };
            }
            RetryDelay => {
                self.expect(&Colon);
                tmpl.retry_delay = Some(self.scalar_value());
            }
            Timeout => {
                self.expect(&Colon);
                tmpl.timeout = Some(self.scalar_value());
            }
            Docker => {
                self.expect(&Colon);
                tmpl.docker = self.scalar_value() == "true";
            }
            Remote => {
                self.expect(&Colon);
                tmpl.remote = Some(self.scalar_value());
            }
            Parallel => {
                self.expect(&Colon);
                tmpl.parallel = self.scalar_value() == "true";
            }
            If => {
                self.expect(&Colon);
                tmpl.condition = Some(self.rest_of_line_joined());
            }
            other => {
                self.error(format!("unknown template directive {other:?}"));
                if matches!(self.peek(), Colon) {
                    self.advance();
                }
            }
        }
    }

    fn parse_profile(&mut self, file: &mut FluxFile) {
        self.advance(); // profile
        let name = match self.advance().kind {
            TokenKind::Ident(s) => s,
            other => {
                self.error(format!("expected profile name, found {other:?}"));
                return;
            }
        };
        let mut env = BTreeMap::new();
        self.parse_block(|p, directive| {
            if matches!(directive, TokenKind::Env) {
                env = p.env_block();
            } else {
                p.error(format!("unknown profile directive {directive:?}"));
            }
        });
        file.profiles.push(Profile { name, env });
    }

    fn parse_group(&mut self, file: &mut FluxFile) {
        self.advance(); // group
        let name = match self.advance().kind {
            TokenKind::Ident(s) => s,
            other => {
                self.error(format!("expected group name, found {other:?}"));
                return;
            }
        };
        let tasks = self.list_value();
        file.groups.push(TaskGroup { name, tasks });
    }
}

pub fn parse_with_includes(
    source: &str,
    base_dir: &Path,
    seen: &mut Vec<PathBuf>,
) -> Result<FluxFile, ParseError> {
    let mut parser = Parser::new(source);
    let mut file = parser.parse()?;

    let includes = std::mem::take(&mut file.includes);
    for include in includes {
        let path = base_dir.join(&include);
        let canon = path
            .canonicalize()
            .unwrap_or_else(|_| path.clone());
        if seen.contains(&canon) {
            return Err(ParseError::Joined(format!(
                "include cycle detected at '{}'",
                include
            )));
        }
        seen.push(canon);

        let included_src = std::fs::read_to_string(&path).map_err(|e| {
            ParseError::Joined(format!("failed to read include '{}': {e}", path.display()))
        })?;
        let included_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let included = parse_with_includes(&included_src, &included_dir, seen)?;

        for (k, v) in included.vars {
            file.vars.entry(k).or_insert(v);
        }
        file.tasks.extend(included.tasks);
        file.profiles.extend(included.profiles);
        file.templates.extend(included.templates);
        file.groups.extend(included.groups);
        for (k, v) in included.aliases {
            file.aliases.entry(k).or_insert(v);
        }
    }

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_task_pipeline() {
        let src = r#"
task clean:
    run:
        echo cleaning
task build:
    deps: clean
    run:
        echo building
task test:
    deps: build
    run:
        echo testing
"#;
        let file = Parser::parse_file(src, Path::new(".")).expect("should parse");
        assert_eq!(file.tasks.len(), 3);
        assert_eq!(file.tasks[0].name, "clean");
        assert_eq!(file.tasks[1].deps, vec!["clean"]);
        assert_eq!(file.tasks[2].run, vec!["echo testing"]);
    }

    #[test]
    fn parses_var_and_task_env() {
        let src = r#"
var NAME = "flux"
task build:
    env:
        APP = flux
    run:
        echo building ${NAME}
"#;
        let file = Parser::parse_file(src, Path::new(".")).unwrap();
        assert_eq!(file.vars.get("NAME"), Some(&"flux".to_string()));
        assert_eq!(file.tasks[0].env.get("APP"), Some(&"flux".to_string()));
        assert_eq!(file.tasks[0].run, vec!["echo building ${NAME}"]);
    }

    #[test]
    fn parses_alias_and_matrix() {
        let src = r#"
task deploy:
    alias: d
    matrix:
        env: staging, prod
    run:
        echo deploying
"#;
        let file = Parser::parse_file(src, Path::new(".")).unwrap();
        assert_eq!(file.aliases.get("d"), Some(&"deploy".to_string()));
        let m = file.tasks[0].matrix.as_ref().unwrap();
        assert_eq!(
            m.dimensions.get("env"),
            Some(&vec!["staging".to_string(), "prod".to_string()])
        );
    }

    #[test]
    fn parses_profile_and_pre() {
        let src = r#"
profile prod:
    env:
        STAGE = prod
task deploy:
    pre:
        file: build/app
        command: docker
    run:
        echo deploy
"#;
        let file = Parser::parse_file(src, Path::new(".")).unwrap();
        assert_eq!(file.profiles[0].name, "prod");
        assert_eq!(file.tasks[0].pre.len(), 2);
        assert_eq!(file.tasks[0].pre[0].kind, PreconditionKind::File);
    }

    #[test]
    fn shell_substitution_is_reserialized_literally() {
        let src = r#"
var REV = $(shell "git rev-parse HEAD")
"#;
        let file = Parser::parse_file(src, Path::new(".")).unwrap();
        assert_eq!(
            file.vars.get("REV"),
            Some(&"$(shell \"git rev-parse HEAD\")".to_string())
        );
    }
}
