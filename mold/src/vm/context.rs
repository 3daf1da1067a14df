use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::value::{Value, ValueMap};

type Locals<'vm> = BTreeMap<&'vm str, Value>;

/// The items a loop walks over.
pub(crate) enum LoopItems {
    Seq(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
}

pub(crate) struct LoopState {
    items: LoopItems,
    idx: usize,
    keyed: bool,
}

impl LoopState {
    pub fn new(items: LoopItems, keyed: bool) -> LoopState {
        LoopState {
            items,
            idx: 0,
            keyed,
        }
    }

    /// Returns the next key and item.
    ///
    /// Sequence indexes are produced as string keys.
    fn next(&mut self) -> Option<(Value, Value)> {
        let rv = match self.items {
            LoopItems::Seq(ref items) => items
                .get(self.idx)
                .map(|item| (Value::from(self.idx.to_string()), item.clone())),
            LoopItems::Map(ref map) => map
                .get_index(self.idx)
                .map(|(key, value)| (Value::from(key.as_str()), value.clone())),
        };
        if rv.is_some() {
            self.idx += 1;
        }
        rv
    }
}

/// The next step of a loop as produced by [`Context::next_loop_item`].
pub(crate) struct LoopItem {
    pub keyed: bool,
    pub key: Value,
    pub value: Value,
}

#[derive(Default)]
pub(crate) struct Frame<'vm> {
    pub(crate) locals: Locals<'vm>,
    pub(crate) current_loop: Option<LoopState>,
}

impl<'vm> Frame<'vm> {
    pub fn new_loop(state: LoopState) -> Frame<'vm> {
        Frame {
            locals: Locals::new(),
            current_loop: Some(state),
        }
    }
}

impl<'vm> fmt::Debug for Frame<'vm> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.locals.iter()).finish()
    }
}

#[derive(Default)]
pub(crate) struct Stack {
    values: Vec<Value>,
}

impl Stack {
    pub fn push(&mut self, arg: Value) {
        self.values.push(arg);
    }

    pub fn pop(&mut self) -> Value {
        self.values.pop().expect("stack was empty")
    }

    /// Removes the topmost `n` values in the order they were pushed.
    pub fn pop_many(&mut self, n: usize) -> Vec<Value> {
        let split_at = self
            .values
            .len()
            .checked_sub(n)
            .expect("stack was too small");
        self.values.split_off(split_at)
    }

    pub fn peek(&self) -> &Value {
        self.values.last().expect("stack was empty")
    }
}

/// The variable scopes of a render.
///
/// The root frame holds `$in` and the names bound by `in` directives, every
/// loop pushes a frame for its variables and `$i`.
pub(crate) struct Context<'vm> {
    stack: Vec<Frame<'vm>>,
}

impl<'vm> fmt::Debug for Context<'vm> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        let mut seen = Vec::new();
        for frame in self.stack.iter().rev() {
            for (key, value) in frame.locals.iter() {
                if !seen.contains(key) {
                    seen.push(*key);
                    m.entry(key, value);
                }
            }
        }
        m.finish()
    }
}

impl<'vm> Context<'vm> {
    /// Creates a context for a render of the given input.
    pub fn new(input: Value) -> Context<'vm> {
        let mut root = Frame::default();
        root.locals.insert("$in", input);
        Context { stack: vec![root] }
    }

    /// Stores a variable in the innermost frame.
    pub fn store(&mut self, key: &'vm str, value: Value) {
        self.stack
            .last_mut()
            .expect("cannot store on empty stack")
            .locals
            .insert(key, value);
    }

    /// Rebinds a variable.
    ///
    /// The closest frame that knows the name is updated.  Unknown names are
    /// bound in the root frame so that they outlive loops.
    pub fn assign(&mut self, key: &'vm str, value: Value) {
        let frame = match self
            .stack
            .iter()
            .rposition(|frame| frame.locals.contains_key(key))
        {
            Some(idx) => &mut self.stack[idx],
            None => self.stack.first_mut().expect("cannot assign on empty stack"),
        };
        frame.locals.insert(key, value);
    }

    /// Looks up a variable in the context.
    pub fn load(&self, key: &str) -> Option<Value> {
        self.stack
            .iter()
            .rev()
            .find_map(|frame| frame.locals.get(key))
            .cloned()
    }

    /// Pushes a new layer.
    pub fn push_frame(&mut self, layer: Frame<'vm>) {
        self.stack.push(layer);
    }

    /// Pops the topmost layer.
    pub fn pop_frame(&mut self) -> Frame<'vm> {
        self.stack.pop().expect("pop from empty context stack")
    }

    /// Advances the innermost loop and binds `$i` in its frame.
    ///
    /// Returns `None` once the loop is exhausted.
    pub fn next_loop_item(&mut self) -> Option<LoopItem> {
        let frame = self
            .stack
            .iter_mut()
            .rev()
            .find(|frame| frame.current_loop.is_some())
            .expect("not inside a loop");
        let state = frame.current_loop.as_mut()?;
        let idx = state.idx;
        let keyed = state.keyed;
        let (key, value) = some!(state.next());
        frame.locals.insert("$i", Value::from(idx));
        Some(LoopItem { keyed, key, value })
    }
}
