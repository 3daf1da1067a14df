use std::cell::RefCell;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::compiler::instructions::Instruction;
use crate::environment::MoldShared;
use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::session::RenderSession;
use crate::template::CompiledTemplate;
use crate::utils::write_escaped;
use crate::value::{ops, Value, ValueKind, ValueMap, ValueRepr};
use crate::vm::context::{Context, Frame, LoopItem, LoopItems, LoopState, Stack};

pub use crate::vm::state::State;

mod context;
mod state;

#[cfg(feature = "stacker")]
const STACK_RED_ZONE: usize = 64 * 1024;
#[cfg(feature = "stacker")]
const STACK_GROWTH: usize = 1024 * 1024;

/// Runs `f` on a stack with room for another nested render.
#[inline]
pub(crate) fn recurse<R, F: FnOnce() -> R>(f: F) -> R {
    #[cfg(feature = "stacker")]
    {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, f)
    }
    #[cfg(not(feature = "stacker"))]
    {
        f()
    }
}

/// Helps to evaluate something.
pub struct Vm<'env> {
    shared: &'env MoldShared,
}

impl<'env> Vm<'env> {
    /// Creates a new VM.
    pub fn new(shared: &'env MoldShared) -> Vm<'env> {
        Vm { shared }
    }

    /// Renders a template with the given input.
    ///
    /// `depth` is the number of renders this render is nested in.
    pub fn eval(
        &self,
        template: &CompiledTemplate,
        input: Value,
        out: &mut Output,
        depth: usize,
        session: Option<&'env RefCell<RenderSession>>,
    ) -> Result<(), Error> {
        ok!(self.shared.check_recursion(depth));
        let mut state = State::new(self.shared, Context::new(input), template, depth, session);
        self.eval_state(&mut state, out)
    }

    /// Dispatches a command outside of any render.
    ///
    /// `root` provides the template name the command sees.
    pub fn dispatch(&self, root: &CompiledTemplate, name: &str, arg: Value) -> Result<Value, Error> {
        let state = State::new(self.shared, Context::new(Value::UNDEFINED), root, 0, None);
        state.dispatch(name, arg)
    }

    fn eval_state(&self, state: &mut State<'_, 'env>, out: &mut Output) -> Result<(), Error> {
        let template = state.template;
        let undefined_behavior = self.shared.settings.undefined_behavior;
        let html_escape = self.shared.settings.html_escape;
        let mut stack = Stack::default();
        let mut pc = 0;

        while let Some(instr) = template.instructions().get(pc) {
            // if we only have two arguments that we pull from the stack, we
            // can assign them to a and b.  This slightly reduces the amount of
            // code bloat generated here.  Do the same for a potential error
            // that needs processing.
            let a;
            let b;
            let mut err;

            macro_rules! bail {
                ($err:expr) => {{
                    err = $err;
                    process_err(&mut err, pc, state);
                    return Err(err);
                }};
            }

            macro_rules! ctx_ok {
                ($expr:expr) => {
                    match $expr {
                        Ok(rv) => rv,
                        Err(err) => bail!(err),
                    }
                };
            }

            macro_rules! func_binop {
                ($method:ident) => {{
                    b = stack.pop();
                    a = stack.pop();
                    stack.push(ctx_ok!(ops::$method(&a, &b)));
                }};
            }

            macro_rules! eq_binop {
                ($method:ident, $negate:expr) => {{
                    b = stack.pop();
                    a = stack.pop();
                    stack.push(Value::from(ops::$method(&a, &b) != $negate));
                }};
            }

            macro_rules! cmp_binop {
                ($($ord:pat_param)|+) => {{
                    b = stack.pop();
                    a = stack.pop();
                    let ord = ctx_ok!(ops::compare(&a, &b));
                    stack.push(Value::from(matches!(ord, $(Some($ord))|+)));
                }};
            }

            match instr {
                Instruction::EmitRaw(val) => {
                    // this only produces a format error, no need to attach
                    // location information.
                    ok!(out.write_str(val).map_err(Error::from));
                }
                Instruction::EmitText => {
                    a = stack.pop();
                    ctx_ok!(undefined_behavior.assert_printable(&a));
                    ctx_ok!(write_escaped(out, html_escape, &a).map_err(Error::from));
                }
                Instruction::EmitHtml => {
                    a = stack.pop();
                    ctx_ok!(undefined_behavior.assert_printable(&a));
                    ctx_ok!(write!(out, "{a}").map_err(Error::from));
                }
                Instruction::StoreLocal(name) => {
                    state.ctx.store(name, stack.pop());
                }
                Instruction::Assign(name) => {
                    state.ctx.assign(name, stack.pop());
                }
                Instruction::Lookup(name) => {
                    stack.push(state.lookup(name).unwrap_or(Value::UNDEFINED));
                }
                Instruction::GetAttr(name) => {
                    a = stack.pop();
                    stack.push(match a.get_attr(name) {
                        Some(value) => value,
                        None => ctx_ok!(
                            undefined_behavior.handle_undefined(a.is_undefined() || a.is_none())
                        ),
                    });
                }
                Instruction::GetItem => {
                    a = stack.pop();
                    b = stack.pop();
                    stack.push(match b.get_item(&a) {
                        Some(value) => value,
                        None => ctx_ok!(
                            undefined_behavior.handle_undefined(b.is_undefined() || b.is_none())
                        ),
                    });
                }
                Instruction::LoadConst(value) => {
                    stack.push(value.clone());
                }
                Instruction::BuildMap(pair_count) => {
                    let items = stack.pop_many(pair_count * 2);
                    let mut map = ValueMap::with_capacity(*pair_count);
                    let mut items = items.into_iter();
                    while let (Some(key), Some(value)) = (items.next(), items.next()) {
                        let key = match key.as_str() {
                            Some(key) => key.to_string(),
                            None => key.to_string(),
                        };
                        map.insert(key, value);
                    }
                    stack.push(Value::from(map));
                }
                Instruction::BuildList(count) => {
                    let items = stack.pop_many(*count);
                    stack.push(Value(ValueRepr::Seq(Arc::new(items))));
                }
                Instruction::Add => func_binop!(add),
                Instruction::Sub => func_binop!(sub),
                Instruction::Mul => func_binop!(mul),
                Instruction::Div => func_binop!(div),
                Instruction::Rem => func_binop!(rem),
                Instruction::Eq => eq_binop!(loose_eq, false),
                Instruction::Ne => eq_binop!(loose_eq, true),
                Instruction::StrictEq => eq_binop!(strict_eq, false),
                Instruction::StrictNe => eq_binop!(strict_eq, true),
                Instruction::Gt => cmp_binop!(Ordering::Greater),
                Instruction::Gte => cmp_binop!(Ordering::Greater | Ordering::Equal),
                Instruction::Lt => cmp_binop!(Ordering::Less),
                Instruction::Lte => cmp_binop!(Ordering::Less | Ordering::Equal),
                Instruction::Not => {
                    a = stack.pop();
                    stack.push(Value::from(!ctx_ok!(undefined_behavior.is_true(&a))));
                }
                Instruction::Neg => {
                    a = stack.pop();
                    stack.push(ctx_ok!(ops::neg(&a)));
                }
                Instruction::Pos => {
                    a = stack.pop();
                    stack.push(ops::pos(&a));
                }
                Instruction::PushLoop(keyed) => {
                    a = stack.pop();
                    ctx_ok!(self.push_loop(state, a, *keyed));
                }
                Instruction::Iterate(jump_target) => match state.ctx.next_loop_item() {
                    Some(LoopItem { keyed, key, value }) => {
                        if keyed {
                            stack.push(key);
                        }
                        stack.push(value);
                    }
                    None => {
                        pc = *jump_target;
                        continue;
                    }
                },
                Instruction::PopFrame => {
                    state.ctx.pop_frame();
                }
                Instruction::Jump(jump_target) => {
                    pc = *jump_target;
                    continue;
                }
                Instruction::JumpIfFalse(jump_target) => {
                    a = stack.pop();
                    if !ctx_ok!(undefined_behavior.is_true(&a)) {
                        pc = *jump_target;
                        continue;
                    }
                }
                Instruction::JumpIfFalseOrPop(jump_target) => {
                    if !ctx_ok!(undefined_behavior.is_true(stack.peek())) {
                        pc = *jump_target;
                        continue;
                    } else {
                        stack.pop();
                    }
                }
                Instruction::JumpIfTrueOrPop(jump_target) => {
                    if ctx_ok!(undefined_behavior.is_true(stack.peek())) {
                        pc = *jump_target;
                        continue;
                    } else {
                        stack.pop();
                    }
                }
                Instruction::Call(arg_count) => {
                    let args = stack.pop_many(*arg_count);
                    a = stack.pop();
                    stack.push(ctx_ok!(a.call(state, &args)));
                }
                Instruction::Dispatch(name) => {
                    a = stack.pop();
                    let rv = ctx_ok!(state.dispatch(name, a));
                    if !rv.is_none() && !rv.is_undefined() {
                        ctx_ok!(write!(out, "{rv}").map_err(Error::from));
                    }
                }
                Instruction::DiscardTop => {
                    stack.pop();
                }
            }
            pc += 1;
        }

        Ok(())
    }

    fn push_loop(
        &self,
        state: &mut State<'_, 'env>,
        iterable: Value,
        keyed: bool,
    ) -> Result<(), Error> {
        ok!(state.undefined_behavior().assert_iterable(&iterable));
        let kind = iterable.kind();
        let items = match iterable.0 {
            ValueRepr::Undefined | ValueRepr::None => LoopItems::Seq(Arc::new(Vec::new())),
            ValueRepr::Seq(items) => LoopItems::Seq(items),
            ValueRepr::Map(map) if keyed => LoopItems::Map(map),
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    if kind == ValueKind::Map {
                        "cannot iterate over map as a sequence, use `for key, value in ...`".into()
                    } else {
                        format!("cannot iterate over value of type {kind}")
                    },
                ))
            }
        };
        state.ctx.push_frame(Frame::new_loop(LoopState::new(items, keyed)));
        Ok(())
    }
}

fn process_err(err: &mut Error, pc: usize, state: &State) {
    // only attach line information if the error does not have line info yet.
    if let Some(lineno) = state.template.instructions().get_line(pc) {
        err.set_location(state.name(), lineno);
    }
    // only attach debug info if we don't have one yet and we are in debug mode.
    if state.shared.settings.debug {
        err.attach_debug_source(state.template.source());
    }
}
