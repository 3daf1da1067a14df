use crate::compiler::ast::{self, InputPattern};
use crate::compiler::instructions::{Instruction, Instructions};
use crate::compiler::parser::{parse_expr, parse_for_header, parse_input_pattern, parse_stmt};
use crate::compiler::tokens::Token;
use crate::error::{Error, ErrorKind};
use crate::utils::line_for_offset;
use crate::value::Value;

#[cfg(test)]
use similar_asserts::assert_eq;

/// The kind of a block opened by a directive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BlockKind {
    If,
    For,
}

impl BlockKind {
    fn name(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::For => "for",
        }
    }
}

/// Represents an open block of code that does not yet have updated
/// jump targets.
enum PendingBlock {
    If {
        line: usize,
        jump_instr: Option<usize>,
        exit_instrs: Vec<usize>,
        has_else: bool,
    },
    Loop {
        line: usize,
        iter_instr: usize,
    },
    Branch {
        jump_instr: usize,
    },
    ScBool {
        jump_instrs: Vec<usize>,
    },
}

impl PendingBlock {
    fn directive_block(&self) -> Option<(BlockKind, usize)> {
        match *self {
            PendingBlock::If { line, .. } => Some((BlockKind::If, line)),
            PendingBlock::Loop { line, .. } => Some((BlockKind::For, line)),
            PendingBlock::Branch { .. } | PendingBlock::ScBool { .. } => None,
        }
    }
}

fn patch_jump(instructions: &mut Instructions, instr: usize, target: usize) {
    match instructions.get_mut(instr) {
        Some(&mut Instruction::JumpIfFalse(ref mut jump_target))
        | Some(&mut Instruction::Jump(ref mut jump_target))
        | Some(&mut Instruction::Iterate(ref mut jump_target))
        | Some(&mut Instruction::JumpIfFalseOrPop(ref mut jump_target))
        | Some(&mut Instruction::JumpIfTrueOrPop(ref mut jump_target)) => {
            *jump_target = target;
        }
        _ => unreachable!(),
    }
}

/// Provides a convenient interface to creating instructions for the VM.
///
/// The generator is fed the tokens of a template one by one and keeps the
/// stack of open `if` and `for` blocks to validate their nesting.
pub struct CodeGenerator<'source> {
    instructions: Instructions,
    pending_block: Vec<PendingBlock>,
    current_line: usize,
    name: Option<&'source str>,
    source: &'source str,
}

impl<'source> CodeGenerator<'source> {
    /// Creates a new code generator.
    pub fn new(name: Option<&'source str>, source: &'source str) -> CodeGenerator<'source> {
        CodeGenerator {
            instructions: Instructions::new(),
            pending_block: Vec::with_capacity(32),
            current_line: 0,
            name,
            source,
        }
    }

    /// Sets the current location's line.
    pub fn set_line(&mut self, lineno: usize) {
        self.current_line = lineno;
    }

    /// Add a simple instruction with the current location.
    pub fn add(&mut self, instr: Instruction) -> usize {
        self.instructions.add_with_line(instr, self.current_line)
    }

    /// Returns the next instruction index.
    pub fn next_instruction(&self) -> usize {
        self.instructions.len()
    }

    fn nesting_error(&self, directive: &str, expected: BlockKind) -> Error {
        let mut msg = format!("'{directive}' without matching '{}'", expected.name());
        if let Some((kind, line)) = self.innermost_block() {
            msg.push_str(&format!(
                " (innermost open block is '{}' from line {line})",
                kind.name()
            ));
        }
        Error::new(ErrorKind::NestingError, msg)
    }

    fn innermost_block(&self) -> Option<(BlockKind, usize)> {
        self.pending_block
            .iter()
            .rev()
            .find_map(PendingBlock::directive_block)
    }

    fn expect_innermost(&self, directive: &str, expected: BlockKind) -> Result<(), Error> {
        match self.innermost_block() {
            Some((kind, _)) if kind == expected => Ok(()),
            _ => Err(self.nesting_error(directive, expected)),
        }
    }

    /// Starts a for loop over the value on the stack.
    pub fn start_for_loop(&mut self, keyed: bool) {
        self.add(Instruction::PushLoop(keyed));
        let iter_instr = self.add(Instruction::Iterate(!0));
        self.pending_block.push(PendingBlock::Loop {
            line: self.current_line,
            iter_instr,
        });
    }

    /// Ends the open for loop
    pub fn end_for_loop(&mut self) {
        if let Some(PendingBlock::Loop { iter_instr, .. }) = self.pending_block.pop() {
            self.add(Instruction::Jump(iter_instr));
            let loop_end = self.add(Instruction::PopFrame);
            patch_jump(&mut self.instructions, iter_instr, loop_end);
        } else {
            unreachable!()
        }
    }

    /// Begins an if block on the condition on the stack.
    pub fn start_if(&mut self) {
        let jump_instr = self.add(Instruction::JumpIfFalse(!0));
        self.pending_block.push(PendingBlock::If {
            line: self.current_line,
            jump_instr: Some(jump_instr),
            exit_instrs: Vec::new(),
            has_else: false,
        });
    }

    /// Ends the current branch of the if block.
    ///
    /// Returns `false` if the block already had its `else` branch.
    fn end_if_branch(&mut self, is_else: bool) -> bool {
        if matches!(
            self.pending_block.last(),
            Some(PendingBlock::If { has_else: true, .. })
        ) {
            return false;
        }
        let exit_instr = self.add(Instruction::Jump(!0));
        let next = self.next_instruction();
        match self.pending_block.last_mut() {
            Some(PendingBlock::If {
                jump_instr,
                exit_instrs,
                has_else,
                ..
            }) => {
                exit_instrs.push(exit_instr);
                if let Some(instr) = jump_instr.take() {
                    patch_jump(&mut self.instructions, instr, next);
                }
                *has_else = is_else;
                true
            }
            _ => unreachable!(),
        }
    }

    /// Continues the if block with another condition.
    pub fn start_elif(&mut self, cond: &ast::Expr<'source>) -> bool {
        if !self.end_if_branch(false) {
            return false;
        }
        self.compile_expr(cond);
        let new_jump = self.add(Instruction::JumpIfFalse(!0));
        if let Some(PendingBlock::If { jump_instr, .. }) = self.pending_block.last_mut() {
            *jump_instr = Some(new_jump);
        }
        true
    }

    /// Begins the else branch of the if block.
    pub fn start_else(&mut self) -> bool {
        self.end_if_branch(true)
    }

    /// Closes the current if block.
    pub fn end_if(&mut self) {
        let end = self.next_instruction();
        match self.pending_block.pop() {
            Some(PendingBlock::If {
                jump_instr,
                exit_instrs,
                ..
            }) => {
                for instr in jump_instr.into_iter().chain(exit_instrs) {
                    patch_jump(&mut self.instructions, instr, end);
                }
            }
            _ => unreachable!(),
        }
    }

    /// Begins a conditional expression.
    pub fn start_branch(&mut self) {
        let jump_instr = self.add(Instruction::JumpIfFalse(!0));
        self.pending_block.push(PendingBlock::Branch { jump_instr });
    }

    /// Begins the false side of a conditional expression.
    pub fn start_else_branch(&mut self) {
        let jump_instr = self.add(Instruction::Jump(!0));
        self.end_branch();
        self.pending_block.push(PendingBlock::Branch { jump_instr });
    }

    /// Closes a conditional expression.
    pub fn end_branch(&mut self) {
        let end = self.next_instruction();
        match self.pending_block.pop() {
            Some(PendingBlock::Branch { jump_instr }) => {
                patch_jump(&mut self.instructions, jump_instr, end);
            }
            _ => unreachable!(),
        }
    }

    /// Starts a short-circuited bool block.
    pub fn start_sc_bool(&mut self) {
        self.pending_block.push(PendingBlock::ScBool {
            jump_instrs: Vec::new(),
        });
    }

    /// Emits a short-circuited bool operator.
    pub fn sc_bool(&mut self, and: bool) {
        let instr = self.add(if and {
            Instruction::JumpIfFalseOrPop(!0)
        } else {
            Instruction::JumpIfTrueOrPop(!0)
        });
        if let Some(&mut PendingBlock::ScBool {
            ref mut jump_instrs,
        }) = self.pending_block.last_mut()
        {
            jump_instrs.push(instr);
        } else {
            unreachable!();
        }
    }

    /// Ends a short-circuited bool block.
    pub fn end_sc_bool(&mut self) {
        let end = self.next_instruction();
        if let Some(PendingBlock::ScBool { jump_instrs }) = self.pending_block.pop() {
            for instr in jump_instrs {
                patch_jump(&mut self.instructions, instr, end);
            }
        }
    }

    /// Compiles a token of the template.
    pub fn compile_token(&mut self, token: &Token<'source>) -> Result<(), Error> {
        match *token {
            Token::Literal(text) => {
                self.add(Instruction::EmitRaw(text.to_string()));
                Ok(())
            }
            Token::Directive { command, args, pos } => {
                self.set_line(line_for_offset(self.source, pos));
                self.compile_directive(command, args)
                    .map_err(|err| err.with_location(self.name, self.current_line))
            }
        }
    }

    fn compile_directive(&mut self, command: &str, args: Option<&'source str>) -> Result<(), Error> {
        let args_or_empty = args.unwrap_or("");
        match command {
            "in" => match ok!(parse_input_pattern(args_or_empty)) {
                InputPattern::Whole(name) => {
                    self.add(Instruction::Lookup("$in".into()));
                    self.add(Instruction::StoreLocal(name.into()));
                }
                InputPattern::Destructure(names) => {
                    for name in names {
                        self.add(Instruction::Lookup("$in".into()));
                        self.add(Instruction::GetAttr(name.into()));
                        self.add(Instruction::StoreLocal(name.into()));
                    }
                }
            },
            "t" | "text" => {
                self.compile_expr(&ok!(parse_expr(args_or_empty)));
                self.add(Instruction::EmitText);
            }
            "h" | "html" => {
                self.compile_expr(&ok!(parse_expr(args_or_empty)));
                self.add(Instruction::EmitHtml);
            }
            "d" | "do" => {
                self.compile_stmt(&ok!(parse_stmt(args_or_empty)));
            }
            "if" => {
                self.compile_expr(&ok!(parse_expr(args_or_empty)));
                self.start_if();
            }
            "elif" => {
                ok!(self.expect_innermost("elif", BlockKind::If));
                let cond = ok!(parse_expr(args_or_empty));
                if !self.start_elif(&cond) {
                    return Err(Error::new(
                        ErrorKind::SyntaxError,
                        "'elif' after 'else' in 'if' block",
                    ));
                }
            }
            "else" => {
                ok!(self.expect_innermost("else", BlockKind::If));
                if !self.start_else() {
                    return Err(Error::new(
                        ErrorKind::SyntaxError,
                        "'else' after 'else' in 'if' block",
                    ));
                }
            }
            "/if" => {
                ok!(self.expect_innermost("/if", BlockKind::If));
                self.end_if();
            }
            "for" => {
                let header = ok!(parse_for_header(args_or_empty));
                self.compile_expr(&header.iter);
                self.start_for_loop(header.keyed);
                match (header.keyed, header.second_var) {
                    (true, Some(value_var)) => {
                        self.add(Instruction::StoreLocal(value_var.into()));
                    }
                    (true, None) => {
                        self.add(Instruction::DiscardTop);
                    }
                    (false, _) => {}
                }
                self.add(Instruction::StoreLocal(header.first_var.into()));
            }
            "/for" => {
                ok!(self.expect_innermost("/for", BlockKind::For));
                self.end_for_loop();
            }
            _ => {
                match args {
                    Some(args) => self.compile_expr(&ok!(parse_expr(args))),
                    None => {
                        self.add(Instruction::LoadConst(Value::from(())));
                    }
                }
                self.add(Instruction::Dispatch(command.into()));
            }
        }
        Ok(())
    }

    /// Compiles the argument of a `do` directive.
    pub fn compile_stmt(&mut self, stmt: &ast::Stmt<'source>) {
        match stmt {
            ast::Stmt::Expr(expr) => {
                self.compile_expr(expr);
                self.add(Instruction::DiscardTop);
            }
            ast::Stmt::Assign(name, expr) => {
                self.compile_expr(expr);
                self.add(Instruction::Assign(name.to_string()));
            }
        }
    }

    /// Compiles an expression.
    pub fn compile_expr(&mut self, expr: &ast::Expr<'source>) {
        if let Some(value) = expr.as_const() {
            self.add(Instruction::LoadConst(value));
            return;
        }
        match expr {
            ast::Expr::Var(name) => {
                self.add(Instruction::Lookup(name.to_string()));
            }
            ast::Expr::Const(value) => {
                self.add(Instruction::LoadConst(value.clone()));
            }
            ast::Expr::UnaryOp(c) => {
                self.compile_expr(&c.expr);
                self.add(match c.op {
                    ast::UnaryOpKind::Not => Instruction::Not,
                    ast::UnaryOpKind::Neg => Instruction::Neg,
                    ast::UnaryOpKind::Pos => Instruction::Pos,
                });
            }
            ast::Expr::BinOp(c) => self.compile_bin_op(c),
            ast::Expr::Ternary(t) => {
                self.compile_expr(&t.test_expr);
                self.start_branch();
                self.compile_expr(&t.true_expr);
                self.start_else_branch();
                self.compile_expr(&t.false_expr);
                self.end_branch();
            }
            ast::Expr::GetAttr(g) => {
                self.compile_expr(&g.expr);
                self.add(Instruction::GetAttr(g.name.to_string()));
            }
            ast::Expr::GetItem(g) => {
                self.compile_expr(&g.expr);
                self.compile_expr(&g.subscript_expr);
                self.add(Instruction::GetItem);
            }
            ast::Expr::Call(c) => {
                self.compile_expr(&c.expr);
                for arg in &c.args {
                    self.compile_expr(arg);
                }
                self.add(Instruction::Call(c.args.len()));
            }
            ast::Expr::List(items) => {
                for item in items {
                    self.compile_expr(item);
                }
                self.add(Instruction::BuildList(items.len()));
            }
            ast::Expr::Map(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key);
                    self.compile_expr(value);
                }
                self.add(Instruction::BuildMap(pairs.len()));
            }
        }
    }

    fn compile_bin_op(&mut self, c: &ast::BinOp<'source>) {
        let instr = match c.op {
            ast::BinOpKind::Eq => Instruction::Eq,
            ast::BinOpKind::Ne => Instruction::Ne,
            ast::BinOpKind::StrictEq => Instruction::StrictEq,
            ast::BinOpKind::StrictNe => Instruction::StrictNe,
            ast::BinOpKind::Lt => Instruction::Lt,
            ast::BinOpKind::Lte => Instruction::Lte,
            ast::BinOpKind::Gt => Instruction::Gt,
            ast::BinOpKind::Gte => Instruction::Gte,
            ast::BinOpKind::ScAnd | ast::BinOpKind::ScOr => {
                self.start_sc_bool();
                self.compile_expr(&c.left);
                self.sc_bool(matches!(c.op, ast::BinOpKind::ScAnd));
                self.compile_expr(&c.right);
                self.end_sc_bool();
                return;
            }
            ast::BinOpKind::Add => Instruction::Add,
            ast::BinOpKind::Sub => Instruction::Sub,
            ast::BinOpKind::Mul => Instruction::Mul,
            ast::BinOpKind::Div => Instruction::Div,
            ast::BinOpKind::Rem => Instruction::Rem,
        };
        self.compile_expr(&c.left);
        self.compile_expr(&c.right);
        self.add(instr);
    }

    /// Converts the code generator into the instructions.
    ///
    /// Fails if a block is still open, naming the oldest one.
    pub fn finish(self) -> Result<Instructions, Error> {
        if let Some((kind, line)) = self
            .pending_block
            .iter()
            .find_map(PendingBlock::directive_block)
        {
            return Err(Error::new(
                ErrorKind::NestingError,
                format!("Unclosed {} block in template", kind.name()),
            )
            .with_location(self.name, line));
        }
        Ok(self.instructions)
    }
}

#[cfg(test)]
fn compile(source: &str) -> Result<Instructions, Error> {
    let mut codegen = CodeGenerator::new(None, source);
    for token in ok!(crate::compiler::lexer::tokenize(source, None)) {
        ok!(codegen.compile_token(&token));
    }
    codegen.finish()
}

#[test]
fn test_if_jumps_are_patched() {
    let instr = compile("<<if a>>1<<elif b>>2<<else>>3<</if>>").unwrap();
    let targets: Vec<_> = instr
        .instructions
        .iter()
        .filter_map(|instr| match instr {
            Instruction::Jump(target) | Instruction::JumpIfFalse(target) => Some(*target),
            _ => None,
        })
        .collect();
    assert!(targets.iter().all(|&target| target <= instr.len()));
    assert!(!targets.contains(&!0));
    assert!(matches!(instr.get(instr.len() - 1), Some(Instruction::EmitRaw(s)) if s == "3"));
}

#[test]
fn test_for_loop_layout() {
    let instr = compile("<<for k, v in m>><<t k>><</for>>").unwrap();
    insta::assert_snapshot!(format!("{:#?}", instr), @r###"
    [
        00000 | Lookup("m")  [line 1],
        00001 | PushLoop(true),
        00002 | Iterate(8),
        00003 | StoreLocal("v"),
        00004 | StoreLocal("k"),
        00005 | Lookup("k"),
        00006 | EmitText,
        00007 | Jump(2),
        00008 | PopFrame,
    ]
    "###);
}

#[test]
fn test_nesting_errors() {
    let err = compile("<<if a>>\n<</for>>").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NestingError);
    assert_eq!(err.line(), Some(2));
    assert_eq!(
        err.detail(),
        Some("'/for' without matching 'for' (innermost open block is 'if' from line 1)")
    );

    let err = compile("<</if>>").unwrap_err();
    assert_eq!(err.detail(), Some("'/if' without matching 'if'"));

    let err = compile("<<for x xs>>\n<<if a>>\n<</for>>").unwrap_err();
    assert_eq!(err.line(), Some(3));

    let err = compile("a\n<<if a>>\n<<for x xs>>\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NestingError);
    assert_eq!(err.detail(), Some("Unclosed if block in template"));
    assert_eq!(err.line(), Some(2));

    let err = compile("<<if a>><<else>><<else>><</if>>").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
}
