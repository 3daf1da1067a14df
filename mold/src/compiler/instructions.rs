use std::fmt;

use crate::value::Value;

/// Represents an instruction for the VM.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Emits raw template text
    EmitRaw(String),

    /// Stringifies and HTML escapes the top of the stack into the output
    EmitText,

    /// Stringifies the top of the stack into the output without escaping
    EmitHtml,

    /// Binds a name in the innermost frame
    StoreLocal(String),

    /// Rebinds a name in the closest frame that has it
    Assign(String),

    /// Load a variable
    Lookup(String),

    /// Looks up an attribute.
    GetAttr(String),

    /// Looks up an item.
    GetItem,

    /// Loads a constant value.
    LoadConst(Value),

    /// Builds a map of the last n pairs on the stack.
    BuildMap(usize),

    /// Builds a list of the last n items on the stack.
    BuildList(usize),

    /// Add the top two values
    Add,

    /// Subtract the top two values
    Sub,

    /// Multiply the top two values
    Mul,

    /// Divide the top two values
    Div,

    /// Calculate the remainder the top two values
    Rem,

    /// Loosely compares the top two values (`==`)
    Eq,

    /// Loosely compares the top two values (`!=`)
    Ne,

    /// Compares the top two values (`===`)
    StrictEq,

    /// Compares the top two values (`!==`)
    StrictNe,

    /// `>` operator
    Gt,

    /// `>=` operator
    Gte,

    /// `<` operator
    Lt,

    /// `<=` operator
    Lte,

    /// Logical not of the top of the stack
    Not,

    /// Negates the value.
    Neg,

    /// Converts the value into a number.
    Pos,

    /// Starts a loop over the top of the stack.
    ///
    /// The flag selects key iteration over sequence iteration.
    PushLoop(bool),

    /// Pushes the next loop item(s) or jumps to the target once exhausted.
    ///
    /// Key loops push the key and then the value.
    Iterate(usize),

    /// Pops the topmost frame
    PopFrame,

    /// Jumps to the instruction
    Jump(usize),

    /// Jumps if the top of stack is false
    JumpIfFalse(usize),

    /// Jumps if the value is false, otherwise pops the value
    JumpIfFalseOrPop(usize),

    /// Jumps if the value is true, otherwise pops the value
    JumpIfTrueOrPop(usize),

    /// Calls the value below the last n arguments on the stack
    Call(usize),

    /// Dispatches a registered command with the top of the stack as argument
    Dispatch(String),

    /// Discards the top item
    DiscardTop,
}

#[derive(Copy, Clone)]
struct LineInfo {
    first_instruction: u32,
    line: u32,
}

/// Wrapper around instructions to help with location management.
#[derive(Default, Clone)]
pub struct Instructions {
    pub(crate) instructions: Vec<Instruction>,
    line_infos: Vec<LineInfo>,
}

impl Instructions {
    /// Creates a new instructions object.
    pub fn new() -> Instructions {
        Instructions::default()
    }

    /// Returns an instruction by index
    #[inline(always)]
    pub fn get(&self, idx: usize) -> Option<&Instruction> {
        self.instructions.get(idx)
    }

    /// Returns an instruction by index mutably
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(idx)
    }

    /// Adds a new instruction
    pub fn add(&mut self, instr: Instruction) -> usize {
        let rv = self.instructions.len();
        self.instructions.push(instr);
        rv
    }

    /// Adds a new instruction with line number.
    pub fn add_with_line(&mut self, instr: Instruction, line: usize) -> usize {
        let rv = self.add(instr);
        let same_loc = self
            .line_infos
            .last()
            .map_or(false, |last_loc| last_loc.line as usize == line);
        if !same_loc {
            self.line_infos.push(LineInfo {
                first_instruction: rv as u32,
                line: line as u32,
            });
        }
        rv
    }

    /// Looks up the line for an instruction
    pub fn get_line(&self, idx: usize) -> Option<usize> {
        let loc = match self
            .line_infos
            .binary_search_by_key(&idx, |x| x.first_instruction as usize)
        {
            Ok(idx) => &self.line_infos[idx],
            Err(0) => return None,
            Err(idx) => &self.line_infos[idx - 1],
        };
        Some(loc.line as usize)
    }

    /// Returns the number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Do we have any instructions?
    #[cfg(any(test, feature = "unstable_machinery"))]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct InstructionWrapper<'a>(usize, &'a Instruction, Option<usize>);

        impl<'a> fmt::Debug for InstructionWrapper<'a> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                ok!(write!(f, "{:>05x} | {:?}", self.0, self.1));
                if let Some(line) = self.2 {
                    ok!(write!(f, "  [line {line}]"));
                }
                Ok(())
            }
        }

        let mut list = f.debug_list();
        let mut last_line = None;
        for (idx, instr) in self.instructions.iter().enumerate() {
            let line = self.get_line(idx);
            list.entry(&InstructionWrapper(
                idx,
                instr,
                if line != last_line { line } else { None },
            ));
            last_line = line;
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_line_table() {
        let mut instr = Instructions::new();
        assert!(instr.is_empty());
        instr.add_with_line(Instruction::EmitRaw("a".into()), 1);
        instr.add_with_line(Instruction::Lookup("x".into()), 3);
        instr.add_with_line(Instruction::EmitText, 3);
        instr.add_with_line(Instruction::EmitRaw("b".into()), 4);
        assert_eq!(instr.len(), 4);
        assert!(!instr.is_empty());
        assert_eq!(instr.get_line(0), Some(1));
        assert_eq!(instr.get_line(1), Some(3));
        assert_eq!(instr.get_line(2), Some(3));
        assert_eq!(instr.get_line(3), Some(4));
        assert_eq!(instr.get_line(10), Some(4));
    }

    #[test]
    fn test_debug_dump() {
        let mut instr = Instructions::new();
        instr.add_with_line(Instruction::Lookup("x".into()), 1);
        instr.add_with_line(Instruction::EmitText, 1);
        insta::assert_snapshot!(format!("{:#?}", instr), @r###"
        [
            00000 | Lookup("x")  [line 1],
            00001 | EmitText,
        ]
        "###);
    }
}
