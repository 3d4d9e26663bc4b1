use std::fmt::Write;
use std::rc::Rc;

use super::prelude::Prelude;
use super::value::Value;

/// Executable program node. Each node leaves its result in the machine's
/// accumulator.
#[derive(Debug)]
pub enum Prog {
    Const(Value),
    /// Read `stack[base + offset]`. Arguments have negative offsets.
    FrameLoad(isize),
    Prelude(usize),
    Store {
        slot: usize,
        value: Box<Prog>,
    },
    Block {
        stores: Vec<Prog>,
        result: Box<Prog>,
    },
    Cond {
        test: Box<Prog>,
        then: Box<Prog>,
        otherwise: Box<Prog>,
        line: u32,
    },
    MakeClosure(Rc<Function>),
    Call {
        callee: Box<Prog>,
        args: Vec<Prog>,
        line: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// Copied from the creating frame when the closure is built.
    Frame(isize),
    /// The closure being called.
    Itself,
}

/// Fills capture slot `slot` on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLoad {
    pub slot: usize,
    pub source: CaptureSource,
}

/// Compiled lambda body and its frame layout.
#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub arity: usize,
    /// Slots reserved above the base: block locals plus captures.
    pub frame_size: usize,
    pub captures: Vec<CaptureLoad>,
    pub body: Prog,
}

impl Function {
    /// Offsets read from the creating frame, in capture order.
    pub fn capture_sources(&self) -> impl Iterator<Item = isize> + '_ {
        self.captures.iter().filter_map(|c| match c.source {
            CaptureSource::Frame(offset) => Some(offset),
            CaptureSource::Itself => None,
        })
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

/// A compiled program: the main function plus the prelude its builtin
/// references index into.
#[derive(Debug)]
pub struct Program {
    pub main: Rc<Function>,
    pub prelude: Rc<Prelude>,
}

impl Program {
    /// Disassemble every function, main first, nested functions after the
    /// function that creates them.
    pub fn disassemble(&self) -> String {
        let mut output = String::new();
        self.disassemble_function(&self.main, "<main>", &mut output);
        output
    }

    fn disassemble_function(&self, function: &Function, label: &str, output: &mut String) {
        let _ = writeln!(
            output,
            "== {label}/{} frame={} ==",
            function.arity, function.frame_size
        );
        for capture in &function.captures {
            let from = match capture.source {
                CaptureSource::Frame(offset) => format!("load {offset}"),
                CaptureSource::Itself => "self".to_string(),
            };
            let _ = writeln!(output, "capture {} <- {from}", capture.slot);
        }
        self.disassemble_node(&function.body, 0, output);

        let mut nested = Vec::new();
        collect_functions(&function.body, &mut nested);
        for function in nested {
            self.disassemble_function(&function, function.label(), output);
        }
    }

    fn disassemble_node(&self, prog: &Prog, depth: usize, output: &mut String) {
        let indent = "  ".repeat(depth);
        match prog {
            Prog::Const(value) => {
                let _ = writeln!(output, "{indent}const {value}");
            }
            Prog::FrameLoad(offset) => {
                let _ = writeln!(output, "{indent}load {offset}");
            }
            Prog::Prelude(index) => {
                let name = self.prelude.name(*index).unwrap_or("?");
                let _ = writeln!(output, "{indent}prelude {name}");
            }
            Prog::Store { slot, value } => {
                let _ = writeln!(output, "{indent}store {slot}");
                self.disassemble_node(value, depth + 1, output);
            }
            Prog::Block { stores, result } => {
                let _ = writeln!(output, "{indent}block");
                for store in stores {
                    self.disassemble_node(store, depth + 1, output);
                }
                self.disassemble_node(result, depth + 1, output);
            }
            Prog::Cond {
                test,
                then,
                otherwise,
                line,
            } => {
                let _ = writeln!(output, "{indent}cond [line {line}]");
                self.disassemble_node(test, depth + 1, output);
                self.disassemble_node(then, depth + 1, output);
                self.disassemble_node(otherwise, depth + 1, output);
            }
            Prog::MakeClosure(function) => {
                let _ = writeln!(
                    output,
                    "{indent}closure {}/{}",
                    function.label(),
                    function.arity
                );
            }
            Prog::Call { callee, args, line } => {
                let _ = writeln!(output, "{indent}call {} [line {line}]", args.len());
                self.disassemble_node(callee, depth + 1, output);
                for arg in args {
                    self.disassemble_node(arg, depth + 1, output);
                }
            }
        }
    }
}

/// Functions created directly by `prog`, in source order.
fn collect_functions(prog: &Prog, out: &mut Vec<Rc<Function>>) {
    match prog {
        Prog::Const(_) | Prog::FrameLoad(_) | Prog::Prelude(_) => {}
        Prog::Store { value, .. } => collect_functions(value, out),
        Prog::Block { stores, result } => {
            for store in stores {
                collect_functions(store, out);
            }
            collect_functions(result, out);
        }
        Prog::Cond {
            test,
            then,
            otherwise,
            ..
        } => {
            collect_functions(test, out);
            collect_functions(then, out);
            collect_functions(otherwise, out);
        }
        Prog::MakeClosure(function) => out.push(Rc::clone(function)),
        Prog::Call { callee, args, .. } => {
            collect_functions(callee, out);
            for arg in args {
                collect_functions(arg, out);
            }
        }
    }
}
