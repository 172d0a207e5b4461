//! Execution of lowered code.
//!
//! [`Program::assemble`] flattens a [`TypedCode`] tree into a linear
//! instruction list over numbered registers. `??` and `?:` become
//! conditional jumps, so an untaken branch is never evaluated.
//!
//! A [`Frame`] runs a program against a host [`RenderContext`]. When it
//! reaches a suspension point whose handle is still pending, it stops with
//! [`Step::Detached`] and keeps its program counter and registers. The next
//! [`Frame::run`] re-enters at that exact instruction, so nothing already
//! evaluated runs twice. A frame is a single sequential path: it is either
//! running, finished, or detached at exactly one point.
//!
//! ```rust
//! use weaver_lazy::eval::{Frame, Program, Step};
//! use weaver_lazy::lower::{
//!     BasicEagerCompiler, LazyValueCompiler, StaticSuspensionAnalysis, SuspendingDetacher,
//!     TemplateVariables,
//! };
//! use weaver_lazy::{parse_expr, LazyValue, Registry, SimpleContext, Value};
//!
//! let analysis = StaticSuspensionAnalysis::new();
//! let variables = TemplateVariables::new();
//! let eager = BasicEagerCompiler::new(&analysis, &variables);
//! let compiler = LazyValueCompiler::new(&eager, &analysis, &variables);
//!
//! let expr = parse_expr("{{param:x}} ?? 5").unwrap();
//! let code = compiler.compile(&expr, &mut SuspendingDetacher::new());
//! let program = Program::assemble(&code);
//!
//! let x = LazyValue::pending();
//! let mut ctx = SimpleContext::new();
//! ctx.set_param_lazy("x", x.clone());
//! let registry = Registry::new();
//!
//! let mut frame = Frame::new(&program);
//! assert!(matches!(frame.run(&ctx, &registry).unwrap(), Step::Detached { .. }));
//!
//! x.complete(Value::Null).unwrap();
//! match frame.run(&ctx, &registry).unwrap() {
//!     Step::Done(slot) => assert_eq!(slot.value().unwrap(), Value::Int(5)),
//!     Step::Detached { .. } => unreachable!(),
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::ast::{Operator, Value};
use crate::error::{ExecError, ExecErrorKind};
use crate::lower::code::{Code, CodeKey, Repr, ResumePoint, TypedCode};
use crate::registry::Registry;

mod context;
mod lazy;

pub use context::{RenderContext, SimpleContext};
pub use lazy::{LazyValue, Slot};

// ── Execution options ───────────────────────────────────────────────────

/// Configuration for resource limits and cancellation while running
/// lowered code.
///
/// Create with [`ExecOptions::new()`] and chain builder methods:
///
/// ```rust
/// use weaver_lazy::ExecOptions;
/// use std::sync::Arc;
/// use std::sync::atomic::AtomicBool;
///
/// let token = Arc::new(AtomicBool::new(false));
/// let opts = ExecOptions::new()
///     .max_instructions(10_000)
///     .cancellation_token(token);
/// ```
#[derive(Clone, Default)]
pub struct ExecOptions {
    /// Maximum number of instructions executed across all runs of one
    /// frame before it returns a
    /// [`ResourceLimit`](ExecErrorKind::ResourceLimit) error.
    /// `None` means unlimited.
    pub max_instructions: Option<u64>,

    /// An external flag that can be set to `true` to cancel an
    /// in-progress run. Checked before each instruction.
    pub cancellation_token: Option<Arc<AtomicBool>>,
}

impl ExecOptions {
    /// Create a new `ExecOptions` with all defaults (no limits).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of executed instructions.
    pub fn max_instructions(mut self, limit: u64) -> Self {
        self.max_instructions = Some(limit);
        self
    }

    /// Attach a cancellation token. Set the `AtomicBool` to `true` from
    /// another thread to abort the run.
    pub fn cancellation_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancellation_token = Some(token);
        self
    }
}

impl fmt::Debug for ExecOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecOptions")
            .field("max_instructions", &self.max_instructions)
            .field("cancellation_token", &self.cancellation_token.is_some())
            .finish()
    }
}

// ── Programs ────────────────────────────────────────────────────────────

pub type Reg = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    LoadNull { dst: Reg },
    LoadConst { dst: Reg, value: Value },
    LoadParam { dst: Reg, name: String },
    LoadLocal { dst: Reg, name: String },
    Box { dst: Reg, src: Reg },
    /// Suspension point. Copies `src` to `dst` once it is ready.
    Await { dst: Reg, src: Reg, point: ResumePoint },
    Resolve { dst: Reg, src: Reg },
    Truthy { dst: Reg, src: Reg },
    Binary { dst: Reg, op: Operator, left: Reg, right: Reg },
    Unary { dst: Reg, op: Operator, src: Reg },
    Field { dst: Reg, base: Reg, name: String, null_safe: bool },
    Index { dst: Reg, base: Reg, index: Reg, null_safe: bool },
    List { dst: Reg, items: Vec<Reg> },
    Call { dst: Reg, name: String, args: Vec<Reg> },
    /// Jump when `src` resolves to something other than null/undefined.
    JumpIfPresent { src: Reg, target: usize },
    JumpIfFalse { cond: Reg, target: usize },
    Jump { target: usize },
}

/// Linear form of one lowered expression. The result ends up in
/// register 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub instrs: Vec<Instr>,
    pub registers: usize,
    pub repr: Repr,
}

impl Program {
    pub const RESULT: Reg = 0;

    pub fn assemble(code: &TypedCode) -> Program {
        let mut asm = Assembler::default();
        let dst = asm.alloc();
        asm.emit(&code.code, dst);
        Program {
            instrs: asm.instrs,
            registers: asm.registers,
            repr: code.repr,
        }
    }

    /// The suspension points in instruction order.
    pub fn resume_points(&self) -> Vec<ResumePoint> {
        self.instrs
            .iter()
            .filter_map(|instr| match instr {
                Instr::Await { point, .. } => Some(*point),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
struct Assembler {
    instrs: Vec<Instr>,
    registers: usize,
}

impl Assembler {
    fn alloc(&mut self) -> Reg {
        self.registers += 1;
        self.registers - 1
    }

    fn here(&self) -> usize {
        self.instrs.len()
    }

    fn patch(&mut self, at: usize, to: usize) {
        match &mut self.instrs[at] {
            Instr::JumpIfPresent { target, .. }
            | Instr::JumpIfFalse { target, .. }
            | Instr::Jump { target } => *target = to,
            other => unreachable!("patching non-jump {other:?}"),
        }
    }

    /// Emit `code` with its result in a fresh register.
    fn operand(&mut self, code: &Code) -> Reg {
        let reg = self.alloc();
        self.emit(code, reg);
        reg
    }

    fn emit(&mut self, code: &Code, dst: Reg) {
        match code {
            Code::NullProvider => self.instrs.push(Instr::LoadNull { dst }),
            Code::Const(value) => self.instrs.push(Instr::LoadConst {
                dst,
                value: value.clone(),
            }),
            Code::Param(name) => self.instrs.push(Instr::LoadParam {
                dst,
                name: name.clone(),
            }),
            Code::Local(name) => self.instrs.push(Instr::LoadLocal {
                dst,
                name: name.clone(),
            }),
            Code::Box(inner) => {
                let src = self.operand(inner);
                self.instrs.push(Instr::Box { dst, src });
            }
            Code::WaitFor { provider, point } => {
                let src = self.operand(provider);
                self.instrs.push(Instr::Await {
                    dst,
                    src,
                    point: *point,
                });
            }
            Code::Resolve(inner) => {
                let src = self.operand(inner);
                self.instrs.push(Instr::Resolve { dst, src });
            }
            Code::Truthy(inner) => {
                let src = self.operand(inner);
                self.instrs.push(Instr::Truthy { dst, src });
            }
            Code::FirstNonNullish { left, right } => {
                self.emit(left, dst);
                let jump = self.here();
                self.instrs.push(Instr::JumpIfPresent { src: dst, target: 0 });
                self.emit(right, dst);
                let end = self.here();
                self.patch(jump, end);
            }
            Code::Ternary {
                condition,
                then_code,
                else_code,
            } => {
                let cond = self.operand(condition);
                let to_else = self.here();
                self.instrs.push(Instr::JumpIfFalse { cond, target: 0 });
                self.emit(then_code, dst);
                let to_end = self.here();
                self.instrs.push(Instr::Jump { target: 0 });
                let else_start = self.here();
                self.patch(to_else, else_start);
                self.emit(else_code, dst);
                let end = self.here();
                self.patch(to_end, end);
            }
            Code::Binary { op, left, right } => {
                let left = self.operand(left);
                let right = self.operand(right);
                self.instrs.push(Instr::Binary {
                    dst,
                    op: *op,
                    left,
                    right,
                });
            }
            Code::Unary { op, operand } => {
                let src = self.operand(operand);
                self.instrs.push(Instr::Unary { dst, op: *op, src });
            }
            Code::Access {
                base,
                key,
                null_safe,
            } => {
                let base = self.operand(base);
                let instr = match key {
                    CodeKey::Field(name) => Instr::Field {
                        dst,
                        base,
                        name: name.clone(),
                        null_safe: *null_safe,
                    },
                    CodeKey::Index(index) => Instr::Index {
                        dst,
                        base,
                        index: self.operand(index),
                        null_safe: *null_safe,
                    },
                };
                self.instrs.push(instr);
            }
            Code::List(items) => {
                let items = items.iter().map(|item| self.operand(item)).collect();
                self.instrs.push(Instr::List { dst, items });
            }
            Code::Call { name, args } => {
                let args = args.iter().map(|arg| self.operand(arg)).collect();
                self.instrs.push(Instr::Call {
                    dst,
                    name: name.clone(),
                    args,
                });
            }
        }
    }
}

// ── Frames ──────────────────────────────────────────────────────────────

/// Outcome of one [`Frame::run`].
#[derive(Debug, Clone)]
pub enum Step {
    Done(Slot),
    /// Stopped at `point` until `awaiting` is completed.
    Detached {
        point: ResumePoint,
        awaiting: LazyValue,
    },
}

/// A resumable execution of one [`Program`].
pub struct Frame<'p> {
    program: &'p Program,
    pc: usize,
    regs: Vec<Option<Slot>>,
    options: ExecOptions,
    steps: u64,
    suspended: Option<ResumePoint>,
}

impl<'p> Frame<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self::with_options(program, ExecOptions::default())
    }

    pub fn with_options(program: &'p Program, options: ExecOptions) -> Self {
        Self {
            program,
            pc: 0,
            regs: vec![None; program.registers],
            options,
            steps: 0,
            suspended: None,
        }
    }

    /// The point this frame is detached at, if any.
    pub fn suspended_at(&self) -> Option<ResumePoint> {
        self.suspended
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Instructions executed so far, across all runs.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run until the program finishes or reaches a pending suspension
    /// point. Calling this again after [`Step::Detached`] resumes at the
    /// same point; calling it after [`Step::Done`] returns the result again.
    pub fn run(&mut self, ctx: &impl RenderContext, registry: &Registry) -> Result<Step, ExecError> {
        if let Some(point) = self.suspended {
            debug!(%point, pc = self.pc, "resuming frame");
        }
        while self.pc < self.program.instrs.len() {
            self.check_limits()?;
            let program = self.program;
            let instr = &program.instrs[self.pc];
            if let Instr::Await { dst, src, point } = instr {
                let slot = self.read(*src)?.clone();
                if let Some(awaiting) = slot.pending() {
                    debug!(%point, pc = self.pc, "detaching frame");
                    self.suspended = Some(*point);
                    return Ok(Step::Detached {
                        point: *point,
                        awaiting: awaiting.clone(),
                    });
                }
                self.suspended = None;
                self.regs[*dst] = Some(slot);
                self.pc += 1;
                continue;
            }
            self.pc = self.execute(instr, ctx, registry)?;
        }
        Ok(Step::Done(self.read(Program::RESULT)?.clone()))
    }

    /// Check resource limits and cancellation. Called once per instruction.
    fn check_limits(&mut self) -> Result<(), ExecError> {
        self.steps += 1;

        if let Some(max) = self.options.max_instructions
            && self.steps > max
        {
            return Err(ExecError::new(
                ExecErrorKind::ResourceLimit,
                format!("run exceeded maximum of {max} instructions"),
            ));
        }

        if let Some(ref token) = self.options.cancellation_token
            && token.load(Ordering::Relaxed)
        {
            return Err(ExecError::new(ExecErrorKind::Cancelled, "run cancelled"));
        }

        Ok(())
    }

    fn read(&self, reg: Reg) -> Result<&Slot, ExecError> {
        self.regs[reg].as_ref().ok_or_else(|| {
            ExecError::new(
                ExecErrorKind::HostError,
                format!("register r{reg} read before it was written"),
            )
        })
    }

    fn value(&self, reg: Reg) -> Result<Value, ExecError> {
        self.read(reg)?.value()
    }

    /// Execute a non-suspending instruction and return the next pc.
    fn execute(
        &mut self,
        instr: &Instr,
        ctx: &impl RenderContext,
        registry: &Registry,
    ) -> Result<usize, ExecError> {
        let next = self.pc + 1;
        let (dst, slot) = match instr {
            Instr::LoadNull { dst } => (*dst, Slot::Lazy(LazyValue::null())),
            Instr::LoadConst { dst, value } => (*dst, Slot::Value(value.clone())),
            Instr::LoadParam { dst, name } => {
                let lazy = ctx
                    .resolve_param(name)?
                    .ok_or_else(|| ExecError::undefined_variable("param", name))?;
                (*dst, Slot::Lazy(lazy))
            }
            Instr::LoadLocal { dst, name } => {
                let slot = ctx
                    .resolve_local(name)?
                    .ok_or_else(|| ExecError::undefined_variable("local", name))?;
                (*dst, slot)
            }
            Instr::Box { dst, src } => {
                let slot = match self.read(*src)? {
                    Slot::Value(value) => Slot::Lazy(LazyValue::resolved(value.clone())),
                    lazy @ Slot::Lazy(_) => lazy.clone(),
                };
                (*dst, slot)
            }
            Instr::Resolve { dst, src } => (*dst, Slot::Value(self.value(*src)?)),
            Instr::Truthy { dst, src } => {
                (*dst, Slot::Value(Value::Bool(self.value(*src)?.is_truthy())))
            }
            Instr::Binary {
                dst,
                op,
                left,
                right,
            } => {
                let result = eval_binary_op(&self.value(*left)?, *op, &self.value(*right)?)?;
                (*dst, Slot::Value(result))
            }
            Instr::Unary { dst, op, src } => {
                (*dst, Slot::Value(eval_unary_op(*op, self.value(*src)?)?))
            }
            Instr::Field {
                dst,
                base,
                name,
                null_safe,
            } => {
                let result = eval_field(self.value(*base)?, name, *null_safe)?;
                (*dst, Slot::Value(result))
            }
            Instr::Index {
                dst,
                base,
                index,
                null_safe,
            } => {
                let result = eval_index(self.value(*base)?, &self.value(*index)?, *null_safe)?;
                (*dst, Slot::Value(result))
            }
            Instr::List { dst, items } => {
                let values = items
                    .iter()
                    .map(|reg| self.value(*reg))
                    .collect::<Result<Vec<_>, _>>()?;
                (*dst, Slot::Value(Value::List(values)))
            }
            Instr::Call { dst, name, args } => {
                let values = args
                    .iter()
                    .map(|reg| self.value(*reg))
                    .collect::<Result<Vec<_>, _>>()?;
                (*dst, Slot::Value(registry.call_function(name, values)?))
            }
            Instr::JumpIfPresent { src, target } => {
                let present = match self.read(*src)? {
                    Slot::Value(value) => !value.is_nullish(),
                    Slot::Lazy(lazy) => lazy.or_nullish()?.is_some(),
                };
                return Ok(if present { *target } else { next });
            }
            Instr::JumpIfFalse { cond, target } => {
                let truthy = self.value(*cond)?.is_truthy();
                return Ok(if truthy { next } else { *target });
            }
            Instr::Jump { target } => return Ok(*target),
            Instr::Await { .. } => unreachable!("suspension points are handled by run"),
        };
        self.regs[dst] = Some(slot);
        Ok(next)
    }
}

/// Run `program` to completion, handing every detach to `on_detach`.
///
/// `on_detach` stands in for the host's scheduler: it is called with the
/// suspension point and the pending handle, and must complete that handle
/// (directly or by waiting on whatever does) before returning. A handle
/// still pending afterwards is reported as
/// [`NotReady`](ExecErrorKind::NotReady) rather than spinning.
pub fn drive(
    program: &Program,
    ctx: &impl RenderContext,
    registry: &Registry,
    options: ExecOptions,
    mut on_detach: impl FnMut(ResumePoint, &LazyValue) -> Result<(), ExecError>,
) -> Result<Slot, ExecError> {
    let mut frame = Frame::with_options(program, options);
    loop {
        match frame.run(ctx, registry)? {
            Step::Done(slot) => return Ok(slot),
            Step::Detached { point, awaiting } => {
                on_detach(point, &awaiting)?;
                if !awaiting.is_ready() {
                    return Err(ExecError::new(
                        ExecErrorKind::NotReady,
                        format!("resumed at {point} but the awaited value is still pending"),
                    ));
                }
            }
        }
    }
}

// ── Pure operator evaluation ────────────────────────────────────────────

fn eval_binary_op(left: &Value, op: Operator, right: &Value) -> Result<Value, ExecError> {
    match op {
        Operator::Equal => Ok(Value::Bool(values_equal(left, right))),
        Operator::NotEqual => Ok(Value::Bool(!values_equal(left, right))),

        Operator::LessThan
        | Operator::GreaterThan
        | Operator::LessThanOrEqual
        | Operator::GreaterThanOrEqual => {
            let l = require_number(left)?;
            let r = require_number(right)?;
            let result = match op {
                Operator::LessThan => l < r,
                Operator::GreaterThan => l > r,
                Operator::LessThanOrEqual => l <= r,
                Operator::GreaterThanOrEqual => l >= r,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }

        Operator::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        Operator::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        Operator::NullCoalescing => Ok(if left.is_nullish() {
            right.clone()
        } else {
            left.clone()
        }),

        Operator::Plus => eval_add(left, right),
        Operator::Minus | Operator::Times | Operator::Mod => {
            if let (Value::Int(l), Value::Int(r)) = (left, right) {
                let result = match op {
                    Operator::Minus => l.checked_sub(*r),
                    Operator::Times => l.checked_mul(*r),
                    _ if *r == 0 => return Err(division_by_zero()),
                    _ => l.checked_rem(*r),
                };
                return result.map(Value::Int).ok_or_else(overflow);
            }
            let l = require_number(left)?;
            let r = require_number(right)?;
            let result = match op {
                Operator::Minus => l - r,
                Operator::Times => l * r,
                _ if r == 0.0 => return Err(division_by_zero()),
                _ => l % r,
            };
            Ok(Value::Float(result))
        }
        Operator::DivideBy => {
            let l = require_number(left)?;
            let r = require_number(right)?;
            if r == 0.0 {
                return Err(division_by_zero());
            }
            Ok(Value::Float(l / r))
        }

        Operator::ShiftLeft
        | Operator::ShiftRight
        | Operator::BitwiseAnd
        | Operator::BitwiseXor
        | Operator::BitwiseOr => {
            let l = require_int(left)?;
            let r = require_int(right)?;
            let result = match op {
                Operator::ShiftLeft => u32::try_from(r).ok().and_then(|r| l.checked_shl(r)),
                Operator::ShiftRight => u32::try_from(r).ok().and_then(|r| l.checked_shr(r)),
                Operator::BitwiseAnd => Some(l & r),
                Operator::BitwiseXor => Some(l ^ r),
                _ => Some(l | r),
            };
            result.map(Value::Int).ok_or_else(overflow)
        }

        Operator::AssertNonNull | Operator::Negative | Operator::Not | Operator::Conditional => {
            Err(ExecError::new(
                ExecErrorKind::TypeError,
                format!("`{op}` is not a binary operator"),
            ))
        }
    }
}

fn eval_add(left: &Value, right: &Value) -> Result<Value, ExecError> {
    if let (Value::Int(l), Value::Int(r)) = (left, right) {
        return l.checked_add(*r).map(Value::Int).ok_or_else(overflow);
    }
    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        return Ok(Value::Float(l + r));
    }
    if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
        return Ok(Value::String(format!(
            "{}{}",
            left.to_output_string(),
            right.to_output_string()
        )));
    }
    Err(ExecError::type_error(
        "number or string",
        &format!("{} + {}", left.type_name(), right.type_name()),
    ))
}

fn eval_unary_op(op: Operator, val: Value) -> Result<Value, ExecError> {
    match op {
        Operator::Not => Ok(Value::Bool(!val.is_truthy())),
        Operator::Negative => match val {
            Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
            other => Ok(Value::Float(-require_number(&other)?)),
        },
        Operator::AssertNonNull if val.is_nullish() => Err(ExecError::new(
            ExecErrorKind::NullAccess,
            format!("non-null assertion failed: value is {}", val.type_name()),
        )),
        Operator::AssertNonNull => Ok(val),
        _ => Err(ExecError::new(
            ExecErrorKind::TypeError,
            format!("`{op}` is not a unary operator"),
        )),
    }
}

fn eval_field(base: Value, name: &str, null_safe: bool) -> Result<Value, ExecError> {
    match base {
        nullish if nullish.is_nullish() => null_access(&nullish, null_safe, name),
        Value::Record(mut fields) => Ok(fields.remove(name).unwrap_or(Value::Undefined)),
        Value::List(items) if name == "length" => Ok(Value::Int(items.len() as i64)),
        Value::String(s) if name == "length" => Ok(Value::Int(s.chars().count() as i64)),
        other => Err(ExecError::type_error(
            &format!("record with field `{name}`"),
            other.type_name(),
        )),
    }
}

fn eval_index(base: Value, index: &Value, null_safe: bool) -> Result<Value, ExecError> {
    match (base, index) {
        (nullish, _) if nullish.is_nullish() => {
            null_access(&nullish, null_safe, &index.to_output_string())
        }
        (Value::List(mut items), Value::Int(i)) => Ok(usize::try_from(*i)
            .ok()
            .filter(|i| *i < items.len())
            .map(|i| items.swap_remove(i))
            .unwrap_or(Value::Undefined)),
        (Value::Record(mut fields), Value::String(key)) => {
            Ok(fields.remove(key).unwrap_or(Value::Undefined))
        }
        (base, index) => Err(ExecError::type_error(
            "list[int] or record[string]",
            &format!("{}[{}]", base.type_name(), index.type_name()),
        )),
    }
}

fn null_access(base: &Value, null_safe: bool, key: &str) -> Result<Value, ExecError> {
    if null_safe {
        Ok(Value::Null)
    } else {
        Err(ExecError::new(
            ExecErrorKind::NullAccess,
            format!("cannot read `{key}` of {}", base.type_name()),
        ))
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (a, b) if a.is_nullish() && b.is_nullish() => true,
        (a, b) => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

fn require_number(val: &Value) -> Result<f64, ExecError> {
    val.as_number()
        .ok_or_else(|| ExecError::type_error("number", val.type_name()))
}

fn require_int(val: &Value) -> Result<i64, ExecError> {
    val.as_int()
        .ok_or_else(|| ExecError::type_error("int", val.type_name()))
}

fn division_by_zero() -> ExecError {
    ExecError::new(ExecErrorKind::ArithmeticError, "division by zero")
}

fn overflow() -> ExecError {
    ExecError::new(ExecErrorKind::ArithmeticError, "integer overflow")
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::code::DataKind;

    fn run_code(code: Code, ctx: &SimpleContext) -> Result<Value, ExecError> {
        let program = Program::assemble(&TypedCode::new(code, Repr::Data(DataKind::Any)));
        match Frame::new(&program).run(ctx, &Registry::new())? {
            Step::Done(slot) => slot.value(),
            Step::Detached { point, .. } => panic!("unexpected detach at {point}"),
        }
    }

    fn binary(op: Operator, left: Value, right: Value) -> Code {
        Code::Binary {
            op,
            left: Box::new(Code::Const(left)),
            right: Box::new(Code::Const(right)),
        }
    }

    fn eval(code: Code) -> Value {
        run_code(code, &SimpleContext::new()).unwrap()
    }

    #[test]
    fn test_int_arithmetic_stays_int() {
        assert_eq!(eval(binary(Operator::Plus, 2.into(), 3.into())), Value::Int(5));
        assert_eq!(eval(binary(Operator::Mod, 7.into(), 4.into())), Value::Int(3));
        assert_eq!(
            eval(binary(Operator::DivideBy, 7.into(), 2.into())),
            Value::Float(3.5)
        );
        assert_eq!(
            eval(binary(Operator::Plus, 1.into(), 0.5.into())),
            Value::Float(1.5)
        );
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            eval(binary(Operator::Plus, "n=".into(), 3.into())),
            Value::from("n=3")
        );
    }

    #[test]
    fn test_arithmetic_errors() {
        let ctx = SimpleContext::new();
        let err = run_code(binary(Operator::DivideBy, 1.into(), 0.into()), &ctx).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::ArithmeticError);
        let err = run_code(binary(Operator::Plus, i64::MAX.into(), 1.into()), &ctx).unwrap_err();
        assert_eq!(err.message, "integer overflow");
        let err = run_code(binary(Operator::Minus, true.into(), 1.into()), &ctx).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::TypeError);
    }

    #[test]
    fn test_equality() {
        assert_eq!(eval(binary(Operator::Equal, 1.into(), 1.0.into())), Value::Bool(true));
        assert_eq!(
            eval(binary(Operator::Equal, Value::Null, Value::Undefined)),
            Value::Bool(true)
        );
        assert_eq!(eval(binary(Operator::NotEqual, "a".into(), "b".into())), Value::Bool(true));
    }

    #[test]
    fn test_field_and_index_access() {
        let mut ctx = SimpleContext::new();
        ctx.set_local(
            "user",
            Value::record([("name", Value::from("Ada")), ("tags", vec!["x", "y"].into())]),
        );
        let user = || Box::new(Code::Local("user".into()));

        let name = Code::Access {
            base: user(),
            key: CodeKey::Field("name".into()),
            null_safe: false,
        };
        assert_eq!(run_code(name, &ctx).unwrap(), Value::from("Ada"));

        let tag = Code::Access {
            base: Box::new(Code::Access {
                base: user(),
                key: CodeKey::Field("tags".into()),
                null_safe: false,
            }),
            key: CodeKey::Index(Box::new(Code::Const(Value::Int(1)))),
            null_safe: false,
        };
        assert_eq!(run_code(tag, &ctx).unwrap(), Value::from("y"));

        let missing = Code::Access {
            base: user(),
            key: CodeKey::Field("age".into()),
            null_safe: false,
        };
        assert_eq!(run_code(missing, &ctx).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_null_safe_access() {
        let ctx = SimpleContext::new();
        let access = |null_safe| Code::Access {
            base: Box::new(Code::Const(Value::Null)),
            key: CodeKey::Field("name".into()),
            null_safe,
        };
        assert_eq!(run_code(access(true), &ctx).unwrap(), Value::Null);
        let err = run_code(access(false), &ctx).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::NullAccess);
    }

    #[test]
    fn test_untaken_branch_not_evaluated() {
        // The else branch would fail with an undefined variable.
        let code = Code::Ternary {
            condition: Box::new(Code::Const(Value::Bool(true))),
            then_code: Box::new(Code::Const(Value::Int(1))),
            else_code: Box::new(Code::Param("missing".into())),
        };
        assert_eq!(eval(code), Value::Int(1));

        let code = Code::FirstNonNullish {
            left: Box::new(Code::Const(Value::Int(2))),
            right: Box::new(Code::Param("missing".into())),
        };
        assert_eq!(eval(code), Value::Int(2));
    }

    #[test]
    fn test_undefined_variable() {
        let err = run_code(Code::Param("nope".into()), &SimpleContext::new()).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::UndefinedVariable);
        assert_eq!(err.message, "undefined variable: param:nope");
    }

    #[test]
    fn test_resolve_pending_outside_suspension_point() {
        let mut ctx = SimpleContext::new();
        ctx.set_param_lazy("slow", LazyValue::pending());
        let err = run_code(Code::Resolve(Box::new(Code::Param("slow".into()))), &ctx).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::NotReady);
    }

    #[test]
    fn test_instruction_limit() {
        let code = binary(Operator::Plus, 1.into(), 2.into());
        let program = Program::assemble(&TypedCode::new(code, Repr::RawInt));
        assert_eq!(program.instrs.len(), 3);

        let ctx = SimpleContext::new();
        let registry = Registry::new();
        let mut frame = Frame::with_options(&program, ExecOptions::new().max_instructions(2));
        let err = frame.run(&ctx, &registry).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::ResourceLimit);

        let mut frame = Frame::with_options(&program, ExecOptions::new().max_instructions(3));
        assert!(matches!(frame.run(&ctx, &registry), Ok(Step::Done(_))));
    }

    #[test]
    fn test_cancellation() {
        let token = Arc::new(AtomicBool::new(true));
        let program = Program::assemble(&TypedCode::constant(Value::Int(1)));
        let mut frame = Frame::with_options(&program, ExecOptions::new().cancellation_token(token));
        let err = frame
            .run(&SimpleContext::new(), &Registry::new())
            .unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Cancelled);
    }

    #[test]
    fn test_options_debug_hides_token() {
        let opts = ExecOptions::new().cancellation_token(Arc::new(AtomicBool::new(false)));
        let debug = format!("{opts:?}");
        assert!(debug.contains("cancellation_token: true"));
    }

    #[test]
    fn test_drive_reports_host_that_never_completes() {
        let code = TypedCode::new(
            Code::WaitFor {
                provider: Box::new(Code::Param("slow".into())),
                point: ResumePoint(0),
            },
            Repr::Lazy,
        );
        let program = Program::assemble(&code);
        let mut ctx = SimpleContext::new();
        ctx.set_param_lazy("slow", LazyValue::pending());

        let err = drive(&program, &ctx, &Registry::new(), ExecOptions::new(), |_, _| Ok(()))
            .unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::NotReady);
    }
}
