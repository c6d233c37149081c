/// Step-driven tree-walking evaluator.
///
/// Execution state is an explicit work stack of `Task`s plus an operand
/// stack of evaluated addresses; `step()` pops and executes one task and
/// reports whether the program is still running. Reifying the continuation
/// this way keeps call frames, loops and returns composable without native
/// recursion and lets a host drive execution one unit at a time.
///
/// Every expression result lives at an `Address`. When a destination is
/// supplied, the result is initialized there; otherwise a fresh ephemeral
/// allocation is made (or, for lvalue-like expressions, the existing
/// address is forwarded). Ephemerals are released by the task that
/// consumes them and must all be gone by the end of each statement;
/// persistent allocations are released in reverse order when their scope
/// exits. Returns, breaks and continues unwind the work stack to marks
/// recorded when the frame, loop or scope was entered.
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::ast::{
    BinaryOp, BindingId, DeclId, DeclKind, ExprId, ExprKind, FieldId, PatternId, PatternKind,
    StmtId, StmtKind, TupleOf, UnaryOp,
};
use crate::memory::{Address, Memory, MemoryError};
use crate::program::ExecutableProgram;
use crate::resolver::Def;
use crate::types::Type;
use crate::value::Value;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Runtime error: {0}")]
    Error(String),
    #[error("Runtime error: {0}")]
    Memory(#[from] MemoryError),
    /// Violated interpreter invariant; always a bug, never user error.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

fn internal(msg: impl Into<String>) -> RuntimeError {
    RuntimeError::Internal(msg.into())
}

/// An evaluated expression result: the address holding the value plus the
/// base ephemeral to release once the result is consumed, if any.
#[derive(Debug, Clone)]
struct Operand {
    addr: Address,
    owned: Option<Address>,
}

#[derive(Debug)]
enum Task {
    Stmt(StmtId),
    Eval {
        expr: ExprId,
        dest: Option<Address>,
    },
    PushOperand {
        addr: Address,
        owned: Option<Address>,
    },
    /// Pop one operand and release its ephemeral.
    Discard,
    UnaryApply {
        op: UnaryOp,
        dest: Option<Address>,
    },
    /// Runs after the lhs; handles short-circuiting before the rhs.
    BinaryRhs {
        op: BinaryOp,
        rhs: ExprId,
        dest: Option<Address>,
    },
    BinaryApply {
        op: BinaryOp,
        dest: Option<Address>,
    },
    MemberApply {
        expr: ExprId,
        member: String,
        dest: Option<Address>,
    },
    IndexApply {
        dest: Option<Address>,
    },
    CallApply {
        callee: ExprId,
        args: TupleOf<ExprId>,
        dest: Option<Address>,
    },
    /// Install the callee frame once the argument tuple is filled in.
    EnterCall {
        decl: DeclId,
        callee: Operand,
        args_addr: Address,
        ret: Type,
        dest: Option<Address>,
    },
    FunctionTypeApply {
        field_ids: Vec<FieldId>,
        dest: Option<Address>,
    },
    /// Caller-side continuation of a function call: release the argument
    /// tuple and callee ephemerals and publish the result operand.
    PopFrame {
        callee: Operand,
        args: Operand,
        result: Operand,
    },
    /// The body fell off the end: produce the empty tuple and return.
    ImplicitReturn,
    DoReturn,
    AssignApply {
        target: ExprId,
    },
    BindPattern {
        pattern: PatternId,
        addr: Address,
    },
    FinishGlobal {
        decl: DeclId,
    },
    IfBranch {
        then_body: StmtId,
        else_body: Option<StmtId>,
    },
    LoopTest {
        cond: ExprId,
        body: StmtId,
    },
    LoopBranch {
        cond: ExprId,
        body: StmtId,
    },
    ExitScope {
        to: usize,
    },
    MatchClause {
        stmt: StmtId,
        index: usize,
        subject: Address,
        pop_subject: bool,
    },
    Halt {
        result: Address,
    },
}

#[derive(Debug, Clone, Copy)]
struct LoopCtx {
    /// Work-stack index of the loop's re-test task while the body runs.
    task_base: usize,
    /// Persistent allocations above this mark are reclaimed on break and
    /// continue.
    persist_mark: usize,
}

#[derive(Debug)]
struct Frame {
    result: Address,
    task_mark: usize,
    value_mark: usize,
    locals: HashMap<BindingId, Address>,
    ephemerals: Vec<Address>,
    persistents: Vec<Address>,
    loops: Vec<LoopCtx>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GlobalStatus {
    InProgress,
    Done,
}

pub struct Interpreter<'p> {
    program: &'p ExecutableProgram,
    memory: Memory,
    /// Addresses of initialized global bindings.
    globals: HashMap<BindingId, Address>,
    /// Lazy-initialization state per top-level Initialization.
    global_status: HashMap<DeclId, GlobalStatus>,
    frames: Vec<Frame>,
    tasks: Vec<Task>,
    values: Vec<Operand>,
    exit: Option<i64>,
}

/// Run a type-checked program to completion and return `main`'s result.
pub fn interpret(program: &ExecutableProgram) -> Result<i64, RuntimeError> {
    Interpreter::new(program)?.run()
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p ExecutableProgram) -> Result<Self, RuntimeError> {
        let mut interp = Interpreter {
            program,
            memory: Memory::new(),
            globals: HashMap::new(),
            global_status: HashMap::new(),
            frames: Vec::new(),
            tasks: Vec::new(),
            values: Vec::new(),
            exit: None,
        };
        interp.start()?;
        Ok(interp)
    }

    /// Install the activation of `main`.
    fn start(&mut self) -> Result<(), RuntimeError> {
        let main = self.program.main;
        let f = self
            .program
            .function(main)
            .ok_or_else(|| internal("'main' is not a function"))?;
        let body = f.body;
        let result = self.memory.allocate(Type::Int);
        self.tasks.push(Task::Halt {
            result: result.clone(),
        });
        self.frames.push(Frame {
            result,
            task_mark: self.tasks.len(),
            value_mark: 0,
            locals: HashMap::new(),
            ephemerals: Vec::new(),
            persistents: Vec::new(),
            loops: Vec::new(),
        });
        self.tasks.push(Task::ImplicitReturn);
        if let Some(body) = body {
            self.tasks.push(Task::Stmt(body));
        }
        Ok(())
    }

    /// Execute one unit of work; returns whether the program is still
    /// running.
    pub fn step(&mut self) -> Result<bool, RuntimeError> {
        let Some(task) = self.tasks.pop() else {
            return Ok(false);
        };
        trace!(?task, depth = self.frames.len(), "step");
        self.run_task(task)?;
        Ok(self.exit.is_none() && !self.tasks.is_empty())
    }

    pub fn run(&mut self) -> Result<i64, RuntimeError> {
        while self.step()? {}
        self.exit
            .ok_or_else(|| internal("program stopped without an exit value"))
    }

    // -----------------------------------------------------------------------
    // Small helpers
    // -----------------------------------------------------------------------

    fn frame(&self) -> Result<&Frame, RuntimeError> {
        self.frames.last().ok_or_else(|| internal("no active frame"))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, RuntimeError> {
        self.frames
            .last_mut()
            .ok_or_else(|| internal("no active frame"))
    }

    fn static_type(&self, e: ExprId) -> Result<Type, RuntimeError> {
        self.program
            .static_type(e)
            .cloned()
            .ok_or_else(|| internal(format!("expression {} has no static type", e)))
    }

    fn alloc_ephemeral(&mut self, ty: Type) -> Result<Address, RuntimeError> {
        let addr = self.memory.allocate(ty);
        self.frame_mut()?.ephemerals.push(addr.clone());
        Ok(addr)
    }

    /// Resolve the target of an expression result: the supplied destination
    /// or a fresh ephemeral of the given type.
    fn target(
        &mut self,
        dest: Option<Address>,
        ty: Type,
    ) -> Result<(Address, Option<Address>), RuntimeError> {
        match dest {
            Some(d) => Ok((d, None)),
            None => {
                let a = self.alloc_ephemeral(ty)?;
                Ok((a.clone(), Some(a)))
            }
        }
    }

    fn out(
        &mut self,
        dest: Option<Address>,
        ty: Type,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let (addr, owned) = self.target(dest, ty)?;
        self.memory.initialize(&addr, value)?;
        self.values.push(Operand { addr, owned });
        Ok(())
    }

    fn pop_operand(&mut self) -> Result<Operand, RuntimeError> {
        self.values
            .pop()
            .ok_or_else(|| internal("operand stack underflow"))
    }

    /// Release the ephemeral owned by a consumed operand, if any.
    fn release(&mut self, op: &Operand) -> Result<(), RuntimeError> {
        let Some(base) = &op.owned else {
            return Ok(());
        };
        self.memory.deallocate(base)?;
        let frame = self.frame_mut()?;
        match frame.ephemerals.iter().rposition(|a| a == base) {
            Some(pos) => {
                frame.ephemerals.remove(pos);
                Ok(())
            }
            None => Err(internal("released an ephemeral foreign to this frame")),
        }
    }

    fn read_bool(&mut self, op: &Operand) -> Result<bool, RuntimeError> {
        match self.memory.read(&op.addr)? {
            Value::Bool(b) => Ok(b),
            other => Err(internal(format!("expected a Bool value, found {}", other))),
        }
    }

    // -----------------------------------------------------------------------
    // Task dispatch
    // -----------------------------------------------------------------------

    fn run_task(&mut self, task: Task) -> Result<(), RuntimeError> {
        match task {
            Task::Stmt(stmt_id) => self.run_stmt(stmt_id),
            Task::Eval { expr, dest } => self.run_eval(expr, dest),
            Task::PushOperand { addr, owned } => {
                self.values.push(Operand { addr, owned });
                Ok(())
            }
            Task::Discard => {
                let op = self.pop_operand()?;
                self.release(&op)
            }
            Task::UnaryApply { op, dest } => self.run_unary(op, dest),
            Task::BinaryRhs { op, rhs, dest } => self.run_binary_rhs(op, rhs, dest),
            Task::BinaryApply { op, dest } => self.run_binary_apply(op, dest),
            Task::MemberApply { expr, member, dest } => self.run_member(expr, &member, dest),
            Task::IndexApply { dest } => self.run_index(dest),
            Task::CallApply { callee, args, dest } => self.run_call_apply(callee, &args, dest),
            Task::EnterCall {
                decl,
                callee,
                args_addr,
                ret,
                dest,
            } => self.run_enter_call(decl, callee, args_addr, ret, dest),
            Task::FunctionTypeApply { field_ids, dest } => {
                self.run_function_type_apply(&field_ids, dest)
            }
            Task::PopFrame {
                callee,
                args,
                result,
            } => {
                self.release(&args)?;
                self.release(&callee)?;
                self.values.push(result);
                Ok(())
            }
            Task::ImplicitReturn => {
                let result = self.frame()?.result.clone();
                self.memory.initialize(&result, Value::empty_tuple())?;
                self.unwind_frame()
            }
            Task::DoReturn => {
                let _ = self.pop_operand()?;
                self.unwind_frame()
            }
            Task::AssignApply { target } => {
                let source = self.pop_operand()?;
                let addr = self.lvalue_address(target)?;
                let value = self.memory.read(&source.addr)?;
                self.memory.write(&addr, value)?;
                self.release(&source)
            }
            Task::BindPattern { pattern, addr } => {
                let _ = self.pop_operand()?;
                let ty = self.memory.type_at(&addr)?;
                if !self.match_pattern(pattern, &ty, &addr)? {
                    let value = self.memory.read(&addr)?;
                    return Err(RuntimeError::Error(format!(
                        "initialization pattern did not match value {}",
                        value
                    )));
                }
                Ok(())
            }
            Task::FinishGlobal { decl } => {
                self.global_status.insert(decl, GlobalStatus::Done);
                Ok(())
            }
            Task::IfBranch {
                then_body,
                else_body,
            } => {
                let op = self.pop_operand()?;
                let cond = self.read_bool(&op)?;
                self.release(&op)?;
                if cond {
                    self.tasks.push(Task::Stmt(then_body));
                } else if let Some(else_body) = else_body {
                    self.tasks.push(Task::Stmt(else_body));
                }
                Ok(())
            }
            Task::LoopTest { cond, body } => {
                self.tasks.push(Task::LoopBranch { cond, body });
                self.tasks.push(Task::Eval {
                    expr: cond,
                    dest: None,
                });
                Ok(())
            }
            Task::LoopBranch { cond, body } => {
                let op = self.pop_operand()?;
                let run = self.read_bool(&op)?;
                self.release(&op)?;
                if run {
                    self.tasks.push(Task::LoopTest { cond, body });
                    self.tasks.push(Task::Stmt(body));
                } else {
                    self.frame_mut()?.loops.pop();
                }
                Ok(())
            }
            Task::ExitScope { to } => self.exit_scope(to),
            Task::MatchClause {
                stmt,
                index,
                subject,
                pop_subject,
            } => self.run_match_clause(stmt, index, subject, pop_subject),
            Task::Halt { result } => {
                let value = self.memory.read(&result)?;
                let Value::Int(code) = value else {
                    return Err(internal("'main' produced a non-Int result"));
                };
                self.memory.deallocate(&result)?;
                debug!(code, "program finished");
                self.exit = Some(code);
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn run_stmt(&mut self, stmt_id: StmtId) -> Result<(), RuntimeError> {
        let kind = self.program.ast.stmt(stmt_id).kind.clone();
        match kind {
            StmtKind::Expr(e) => {
                self.tasks.push(Task::Discard);
                self.tasks.push(Task::Eval {
                    expr: e,
                    dest: None,
                });
                Ok(())
            }
            StmtKind::Assign { target, source } => {
                // Assignment may be the first touch of a global; drive its
                // initialization before evaluating anything.
                if let Some(init_decl) = self.pending_global_init(target)? {
                    self.tasks.push(Task::Stmt(stmt_id));
                    self.push_global_init(init_decl)?;
                    return Ok(());
                }
                self.tasks.push(Task::AssignApply { target });
                self.tasks.push(Task::Eval {
                    expr: source,
                    dest: None,
                });
                Ok(())
            }
            StmtKind::Init(init) => {
                let ty = self.static_type(init.initializer)?;
                let addr = self.memory.allocate(ty);
                self.frame_mut()?.persistents.push(addr.clone());
                self.tasks.push(Task::BindPattern {
                    pattern: init.pattern,
                    addr: addr.clone(),
                });
                self.tasks.push(Task::Eval {
                    expr: init.initializer,
                    dest: Some(addr),
                });
                Ok(())
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.tasks.push(Task::IfBranch {
                    then_body,
                    else_body,
                });
                self.tasks.push(Task::Eval {
                    expr: cond,
                    dest: None,
                });
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let task_base = self.tasks.len();
                let frame = self.frame_mut()?;
                frame.loops.push(LoopCtx {
                    task_base,
                    persist_mark: frame.persistents.len(),
                });
                self.tasks.push(Task::LoopTest { cond, body });
                Ok(())
            }
            StmtKind::Match { subject, .. } => {
                let ty = self.static_type(subject)?;
                let slot = self.memory.allocate(ty);
                self.frame_mut()?.persistents.push(slot.clone());
                self.tasks.push(Task::MatchClause {
                    stmt: stmt_id,
                    index: 0,
                    subject: slot.clone(),
                    pop_subject: true,
                });
                self.tasks.push(Task::Eval {
                    expr: subject,
                    dest: Some(slot),
                });
                Ok(())
            }
            StmtKind::Break => self.do_break(),
            StmtKind::Continue => self.do_continue(),
            StmtKind::Return(e) => {
                let result = self.frame()?.result.clone();
                self.tasks.push(Task::DoReturn);
                self.tasks.push(Task::Eval {
                    expr: e,
                    dest: Some(result),
                });
                Ok(())
            }
            StmtKind::Block(stmts) => {
                let mark = self.frame()?.persistents.len();
                self.tasks.push(Task::ExitScope { to: mark });
                for s in stmts.iter().rev() {
                    self.tasks.push(Task::Stmt(*s));
                }
                Ok(())
            }
        }
    }

    /// Reclaim persistent allocations above `to`, newest first, and check
    /// that no ephemeral survived the scope.
    fn exit_scope(&mut self, to: usize) -> Result<(), RuntimeError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| internal("no active frame"))?;
        if !frame.ephemerals.is_empty() {
            return Err(internal("ephemeral allocations leaked at scope exit"));
        }
        while frame.persistents.len() > to {
            if let Some(addr) = frame.persistents.pop() {
                self.memory.deallocate(&addr)?;
            }
        }
        Ok(())
    }

    fn do_break(&mut self) -> Result<(), RuntimeError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| internal("no active frame"))?;
        let ctx = frame
            .loops
            .pop()
            .ok_or_else(|| internal("'break' outside of a loop"))?;
        while frame.persistents.len() > ctx.persist_mark {
            if let Some(addr) = frame.persistents.pop() {
                self.memory.deallocate(&addr)?;
            }
        }
        self.tasks.truncate(ctx.task_base);
        Ok(())
    }

    fn do_continue(&mut self) -> Result<(), RuntimeError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| internal("no active frame"))?;
        let ctx = *frame
            .loops
            .last()
            .ok_or_else(|| internal("'continue' outside of a loop"))?;
        while frame.persistents.len() > ctx.persist_mark {
            if let Some(addr) = frame.persistents.pop() {
                self.memory.deallocate(&addr)?;
            }
        }
        // Keep the loop's re-test task on top of the work stack.
        self.tasks.truncate(ctx.task_base + 1);
        Ok(())
    }

    /// Tear down the current frame on return: reclaim its allocations and
    /// unwind the work and operand stacks to the call marks.
    fn unwind_frame(&mut self) -> Result<(), RuntimeError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| internal("return without a frame"))?;
        if !frame.ephemerals.is_empty() {
            return Err(internal("ephemeral allocations leaked at function return"));
        }
        for addr in frame.persistents.iter().rev() {
            self.memory.deallocate(addr)?;
        }
        self.tasks.truncate(frame.task_mark);
        self.values.truncate(frame.value_mark);
        debug!(depth = self.frames.len(), "frame popped");
        Ok(())
    }

    fn run_match_clause(
        &mut self,
        stmt: StmtId,
        index: usize,
        subject: Address,
        pop_subject: bool,
    ) -> Result<(), RuntimeError> {
        if pop_subject {
            let _ = self.pop_operand()?;
        }
        let StmtKind::Match { clauses, .. } = self.program.ast.stmt(stmt).kind.clone() else {
            return Err(internal("match clause outside a match statement"));
        };
        let Some(clause) = clauses.get(index) else {
            let value = self.memory.read(&subject)?;
            return Err(RuntimeError::Error(format!(
                "no matching clause for value {}",
                value
            )));
        };
        match clause.pattern {
            None => {
                self.tasks.push(Task::Stmt(clause.body));
                Ok(())
            }
            Some(pattern) => {
                let ty = self.memory.type_at(&subject)?;
                if self.match_pattern(pattern, &ty, &subject)? {
                    self.tasks.push(Task::Stmt(clause.body));
                } else {
                    self.tasks.push(Task::MatchClause {
                        stmt,
                        index: index + 1,
                        subject,
                        pop_subject: false,
                    });
                }
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Expression evaluation
    // -----------------------------------------------------------------------

    fn run_eval(&mut self, expr: ExprId, dest: Option<Address>) -> Result<(), RuntimeError> {
        let kind = self.program.ast.expr(expr).kind.clone();
        match kind {
            ExprKind::IntLit(n) => self.out(dest, Type::Int, Value::Int(n)),
            ExprKind::BoolLit(b) => self.out(dest, Type::Bool, Value::Bool(b)),
            ExprKind::IntType => self.out(dest, Type::TypeT, Value::Type(Type::Int)),
            ExprKind::BoolType => self.out(dest, Type::TypeT, Value::Type(Type::Bool)),
            ExprKind::TypeType => self.out(dest, Type::TypeT, Value::Type(Type::TypeT)),
            ExprKind::Name(_) => self.eval_name(expr, dest),
            ExprKind::TupleLit(fields) => {
                let ty = self.static_type(expr)?;
                let (targt, owned) = self.target(dest, ty)?;
                self.memory.start_tuple(&targt)?;
                self.tasks.push(Task::PushOperand {
                    addr: targt.clone(),
                    owned,
                });
                for field in fields.fields.iter().rev() {
                    self.tasks.push(Task::Discard);
                    self.tasks.push(Task::Eval {
                        expr: field.value,
                        dest: Some(targt.field(field.id.clone())),
                    });
                }
                Ok(())
            }
            ExprKind::Unary(op, operand) => {
                self.tasks.push(Task::UnaryApply { op, dest });
                self.tasks.push(Task::Eval {
                    expr: operand,
                    dest: None,
                });
                Ok(())
            }
            ExprKind::Binary(op, lhs, rhs) => {
                self.tasks.push(Task::BinaryRhs { op, rhs, dest });
                self.tasks.push(Task::Eval {
                    expr: lhs,
                    dest: None,
                });
                Ok(())
            }
            ExprKind::Member { base, member } => {
                self.tasks.push(Task::MemberApply { expr, member, dest });
                self.tasks.push(Task::Eval {
                    expr: base,
                    dest: None,
                });
                Ok(())
            }
            ExprKind::Index { base, offset } => {
                self.tasks.push(Task::IndexApply { dest });
                self.tasks.push(Task::Eval {
                    expr: offset,
                    dest: None,
                });
                self.tasks.push(Task::Eval {
                    expr: base,
                    dest: None,
                });
                Ok(())
            }
            ExprKind::Call { callee, args } => {
                self.tasks.push(Task::CallApply { callee, args, dest });
                self.tasks.push(Task::Eval {
                    expr: callee,
                    dest: None,
                });
                Ok(())
            }
            ExprKind::FunctionType { params, ret } => {
                let mut field_ids = Vec::new();
                let mut param_exprs = Vec::new();
                for field in params.iter() {
                    field_ids.push(field.id.clone());
                    param_exprs.push(self.pattern_type_expr(field.value)?);
                }
                let ret_expr = self.pattern_type_expr(ret)?;
                self.tasks.push(Task::FunctionTypeApply { field_ids, dest });
                self.tasks.push(Task::Eval {
                    expr: ret_expr,
                    dest: None,
                });
                for e in param_exprs.iter().rev() {
                    self.tasks.push(Task::Eval {
                        expr: *e,
                        dest: None,
                    });
                }
                Ok(())
            }
        }
    }

    /// The type expression inside a `fnty` parameter or return position.
    fn pattern_type_expr(&self, p: PatternId) -> Result<ExprId, RuntimeError> {
        match &self.program.ast.pattern(p).kind {
            PatternKind::Atom(e) => Ok(*e),
            _ => Err(RuntimeError::Error(
                "unsupported pattern in a function type".to_string(),
            )),
        }
    }

    fn eval_name(&mut self, expr: ExprId, dest: Option<Address>) -> Result<(), RuntimeError> {
        let def = self
            .program
            .resolution
            .definition
            .get(&expr)
            .cloned()
            .ok_or_else(|| internal("unresolved name survived resolution"))?;
        match def {
            Def::Struct(d) => {
                let t = Type::Struct(self.program.nominal(d));
                self.out(dest, Type::TypeT, Value::Type(t))
            }
            Def::Choice(d) => {
                let t = Type::Choice(self.program.nominal(d));
                self.out(dest, Type::TypeT, Value::Type(t))
            }
            Def::Function(d) => {
                let ty = self.static_type(expr)?;
                let name: Rc<str> = self
                    .program
                    .function(d)
                    .map(|f| Rc::from(f.name.as_str()))
                    .ok_or_else(|| internal("function definition missing"))?;
                self.out(
                    dest,
                    ty.clone(),
                    Value::Function { ty, decl: d, name },
                )
            }
            Def::Binding(b) => {
                let local = self.frame()?.locals.get(&b).cloned();
                let addr = match local.or_else(|| self.globals.get(&b).cloned()) {
                    Some(addr) => addr,
                    None if self.program.resolution.globals.contains(&b) => {
                        // First use of a global: run its initialization and
                        // then retry this evaluation.
                        let init_decl = self
                            .program
                            .tables
                            .enclosing_initialization
                            .get(&b)
                            .copied()
                            .ok_or_else(|| internal("global without an initialization"))?;
                        self.tasks.push(Task::Eval { expr, dest });
                        self.push_global_init(init_decl)?;
                        return Ok(());
                    }
                    None => return Err(internal("binding has no address")),
                };
                match dest {
                    Some(d) => {
                        let value = self.memory.read(&addr)?;
                        self.memory.initialize(&d, value)?;
                        self.values.push(Operand {
                            addr: d,
                            owned: None,
                        });
                        Ok(())
                    }
                    None => {
                        self.values.push(Operand { addr, owned: None });
                        Ok(())
                    }
                }
            }
            Def::Alternative { .. } | Def::Member { .. } => {
                Err(internal("name denotes a nominal member outside its body"))
            }
        }
    }

    fn run_unary(&mut self, op: UnaryOp, dest: Option<Address>) -> Result<(), RuntimeError> {
        let operand = self.pop_operand()?;
        let value = self.memory.read(&operand.addr)?;
        self.release(&operand)?;
        match (op, value) {
            (UnaryOp::Neg, Value::Int(n)) => {
                let n = n
                    .checked_neg()
                    .ok_or_else(|| RuntimeError::Error("integer overflow".to_string()))?;
                self.out(dest, Type::Int, Value::Int(n))
            }
            (UnaryOp::Not, Value::Bool(b)) => self.out(dest, Type::Bool, Value::Bool(!b)),
            (_, other) => Err(internal(format!("bad unary operand {}", other))),
        }
    }

    fn run_binary_rhs(
        &mut self,
        op: BinaryOp,
        rhs: ExprId,
        dest: Option<Address>,
    ) -> Result<(), RuntimeError> {
        let short = match op {
            BinaryOp::And | BinaryOp::Or => {
                let lhs = self
                    .values
                    .last()
                    .cloned()
                    .ok_or_else(|| internal("operand stack underflow"))?;
                let b = self.read_bool(&lhs)?;
                match op {
                    BinaryOp::And if !b => Some(false),
                    BinaryOp::Or if b => Some(true),
                    _ => None,
                }
            }
            _ => None,
        };
        if let Some(result) = short {
            let lhs = self.pop_operand()?;
            self.release(&lhs)?;
            return self.out(dest, Type::Bool, Value::Bool(result));
        }
        self.tasks.push(Task::BinaryApply { op, dest });
        self.tasks.push(Task::Eval {
            expr: rhs,
            dest: None,
        });
        Ok(())
    }

    fn run_binary_apply(
        &mut self,
        op: BinaryOp,
        dest: Option<Address>,
    ) -> Result<(), RuntimeError> {
        let rhs = self.pop_operand()?;
        let lhs = self.pop_operand()?;
        let lv = self.memory.read(&lhs.addr)?;
        let rv = self.memory.read(&rhs.addr)?;
        self.release(&rhs)?;
        self.release(&lhs)?;
        match op {
            BinaryOp::Add | BinaryOp::Sub => {
                let (Value::Int(a), Value::Int(b)) = (&lv, &rv) else {
                    return Err(internal("non-Int arithmetic operands"));
                };
                let n = match op {
                    BinaryOp::Add => a.checked_add(*b),
                    _ => a.checked_sub(*b),
                }
                .ok_or_else(|| RuntimeError::Error("integer overflow".to_string()))?;
                self.out(dest, Type::Int, Value::Int(n))
            }
            BinaryOp::Eq => self.out(dest, Type::Bool, Value::Bool(lv.equals(&rv))),
            BinaryOp::And | BinaryOp::Or => {
                // The short-circuit case already happened; the result is
                // whatever the rhs produced.
                let Value::Bool(b) = rv else {
                    return Err(internal("non-Bool logical operand"));
                };
                self.out(dest, Type::Bool, Value::Bool(b))
            }
        }
    }

    fn run_member(
        &mut self,
        expr: ExprId,
        member: &str,
        dest: Option<Address>,
    ) -> Result<(), RuntimeError> {
        let base = self.pop_operand()?;
        let base_ty = self.memory.type_at(&base.addr)?;
        match base_ty {
            Type::Tuple(_) | Type::Struct(_) => {
                let proj = match base_ty {
                    Type::Struct(_) => base
                        .addr
                        .payload()
                        .field(FieldId::Label(member.to_string())),
                    _ => base.addr.field(FieldId::Label(member.to_string())),
                };
                self.forward_projection(proj, base, dest)
            }
            Type::TypeT => {
                let value = self.memory.read(&base.addr)?;
                self.release(&base)?;
                let Value::Type(Type::Choice(id)) = value else {
                    return Err(internal("member access through a non-choice type value"));
                };
                let index = self
                    .program
                    .find_alternative(id.decl, member)
                    .ok_or_else(|| internal("alternative vanished after checking"))?;
                let name = self
                    .program
                    .alternative_name(id.decl, index)
                    .ok_or_else(|| internal("alternative vanished after checking"))?;
                let payload = self.program.alternative_payload(id.decl, index);
                let expr_ty = self.static_type(expr)?;
                match &expr_ty {
                    Type::Alternative { .. } => self.out(
                        dest,
                        expr_ty.clone(),
                        Value::Alternative {
                            choice: id,
                            index,
                            name,
                            payload,
                        },
                    ),
                    Type::Choice(_) => self.out(
                        dest,
                        expr_ty.clone(),
                        Value::Choice {
                            id,
                            discriminant: index,
                            alternative: name,
                            payload: Box::new(Value::empty_tuple()),
                        },
                    ),
                    other => Err(internal(format!(
                        "alternative reference typed as {}",
                        other
                    ))),
                }
            }
            other => Err(internal(format!("member access on value of type {}", other))),
        }
    }

    /// Copy a projection into the destination, or forward it as an lvalue
    /// operand that inherits ownership of the base ephemeral.
    fn forward_projection(
        &mut self,
        proj: Address,
        base: Operand,
        dest: Option<Address>,
    ) -> Result<(), RuntimeError> {
        match dest {
            Some(d) => {
                let value = self.memory.read(&proj)?;
                self.memory.initialize(&d, value)?;
                self.release(&base)?;
                self.values.push(Operand {
                    addr: d,
                    owned: None,
                });
                Ok(())
            }
            None => {
                self.values.push(Operand {
                    addr: proj,
                    owned: base.owned,
                });
                Ok(())
            }
        }
    }

    fn run_index(&mut self, dest: Option<Address>) -> Result<(), RuntimeError> {
        let offset = self.pop_operand()?;
        let base = self.pop_operand()?;
        let Value::Int(n) = self.memory.read(&offset.addr)? else {
            return Err(internal("non-Int tuple index"));
        };
        self.release(&offset)?;
        if n < 0 {
            return Err(RuntimeError::Error(format!(
                "tuple has no value at position {}",
                n
            )));
        }
        let proj = base.addr.field(FieldId::Position(n as usize));
        self.forward_projection(proj, base, dest)
    }

    fn run_call_apply(
        &mut self,
        callee: ExprId,
        args: &TupleOf<ExprId>,
        dest: Option<Address>,
    ) -> Result<(), RuntimeError> {
        let callee_op = self.pop_operand()?;
        let callee_ty = self.static_type(callee)?;
        match callee_ty {
            Type::Function { params, ret } => {
                let Value::Function { decl, .. } = self.memory.read(&callee_op.addr)? else {
                    return Err(internal("callee is not a function value"));
                };
                let args_addr = self.alloc_ephemeral(Type::Tuple(params))?;
                self.memory.start_tuple(&args_addr)?;
                self.tasks.push(Task::EnterCall {
                    decl,
                    callee: callee_op,
                    args_addr: args_addr.clone(),
                    ret: *ret,
                    dest,
                });
                for field in args.fields.iter().rev() {
                    self.tasks.push(Task::Discard);
                    self.tasks.push(Task::Eval {
                        expr: field.value,
                        dest: Some(args_addr.field(field.id.clone())),
                    });
                }
                Ok(())
            }
            Type::TypeT => {
                // Struct literal: T(.a = …, .b = …).
                let value = self.memory.read(&callee_op.addr)?;
                self.release(&callee_op)?;
                let Value::Type(Type::Struct(id)) = value else {
                    return Err(internal("construction through a non-struct type value"));
                };
                let params = self.program.initializer_parameters(id.decl);
                let (targt, owned) = self.target(dest, Type::Struct(id.clone()))?;
                self.memory.start_struct(&targt, id, &params)?;
                let payload = targt.payload();
                self.tasks.push(Task::PushOperand { addr: targt, owned });
                for field in args.fields.iter().rev() {
                    self.tasks.push(Task::Discard);
                    self.tasks.push(Task::Eval {
                        expr: field.value,
                        dest: Some(payload.field(field.id.clone())),
                    });
                }
                Ok(())
            }
            Type::Alternative { .. } => {
                let value = self.memory.read(&callee_op.addr)?;
                self.release(&callee_op)?;
                let Value::Alternative {
                    choice,
                    index,
                    name,
                    payload: payload_tys,
                } = value
                else {
                    return Err(internal("callee is not an alternative value"));
                };
                let (targt, owned) = self.target(dest, Type::Choice(choice.clone()))?;
                self.memory
                    .start_choice(&targt, choice, index, name, &payload_tys)?;
                let payload = targt.payload();
                self.tasks.push(Task::PushOperand { addr: targt, owned });
                for field in args.fields.iter().rev() {
                    self.tasks.push(Task::Discard);
                    self.tasks.push(Task::Eval {
                        expr: field.value,
                        dest: Some(payload.field(field.id.clone())),
                    });
                }
                Ok(())
            }
            other => Err(internal(format!(
                "call through non-callable static type {}",
                other
            ))),
        }
    }

    fn run_enter_call(
        &mut self,
        decl: DeclId,
        callee: Operand,
        args_addr: Address,
        ret: Type,
        dest: Option<Address>,
    ) -> Result<(), RuntimeError> {
        let (result, result_owned) = self.target(dest, ret)?;
        self.tasks.push(Task::PopFrame {
            callee,
            args: Operand {
                addr: args_addr.clone(),
                owned: Some(args_addr.clone()),
            },
            result: Operand {
                addr: result.clone(),
                owned: result_owned,
            },
        });
        self.frames.push(Frame {
            result,
            task_mark: self.tasks.len(),
            value_mark: self.values.len(),
            locals: HashMap::new(),
            ephemerals: Vec::new(),
            persistents: Vec::new(),
            loops: Vec::new(),
        });
        debug!(depth = self.frames.len(), "frame pushed");

        let f = self
            .program
            .function(decl)
            .ok_or_else(|| internal("call target is not a function"))?;
        let params = f.params.clone();
        let body = f.body;
        for field in params.iter() {
            let arg_addr = args_addr.field(field.id.clone());
            let arg_ty = self.memory.type_at(&arg_addr)?;
            if !self.match_pattern(field.value, &arg_ty, &arg_addr)? {
                return Err(RuntimeError::Error(
                    "arguments failed to bind at call site".to_string(),
                ));
            }
        }
        self.tasks.push(Task::ImplicitReturn);
        if let Some(body) = body {
            self.tasks.push(Task::Stmt(body));
        }
        Ok(())
    }

    fn run_function_type_apply(
        &mut self,
        field_ids: &[FieldId],
        dest: Option<Address>,
    ) -> Result<(), RuntimeError> {
        let ret_op = self.pop_operand()?;
        let Value::Type(ret) = self.memory.read(&ret_op.addr)? else {
            return Err(internal("non-type in function type position"));
        };
        self.release(&ret_op)?;
        let mut params = Vec::new();
        for id in field_ids.iter().rev() {
            let op = self.pop_operand()?;
            let Value::Type(t) = self.memory.read(&op.addr)? else {
                return Err(internal("non-type in function type position"));
            };
            self.release(&op)?;
            params.push((id.clone(), t));
        }
        params.reverse();
        let mut param_tuple = TupleOf::new();
        for (id, t) in params {
            param_tuple.push(id, t);
        }
        let fun = Type::Function {
            params: param_tuple,
            ret: Box::new(ret),
        };
        self.out(dest, Type::TypeT, Value::Type(fun))
    }

    // -----------------------------------------------------------------------
    // Globals
    // -----------------------------------------------------------------------

    /// The pending initialization of the global at the root of an
    /// assignment target, if it has not run yet.
    fn pending_global_init(&self, target: ExprId) -> Result<Option<DeclId>, RuntimeError> {
        let mut e = target;
        let root = loop {
            match &self.program.ast.expr(e).kind {
                ExprKind::Name(_) => break e,
                ExprKind::Member { base, .. } => e = *base,
                ExprKind::Index { base, .. } => e = *base,
                _ => return Ok(None),
            }
        };
        let Some(Def::Binding(b)) = self.program.resolution.definition.get(&root) else {
            return Ok(None);
        };
        if !self.program.resolution.globals.contains(b) || self.globals.contains_key(b) {
            return Ok(None);
        }
        let init_decl = self
            .program
            .tables
            .enclosing_initialization
            .get(b)
            .copied()
            .ok_or_else(|| internal("global without an initialization"))?;
        Ok(Some(init_decl))
    }

    /// Schedule the lazy initialization of a top-level `var`.
    fn push_global_init(&mut self, decl: DeclId) -> Result<(), RuntimeError> {
        match self.global_status.get(&decl) {
            Some(GlobalStatus::InProgress) => {
                return Err(RuntimeError::Error(
                    "cycle detected in global initialization".to_string(),
                ));
            }
            Some(GlobalStatus::Done) => return Ok(()),
            None => {}
        }
        self.global_status.insert(decl, GlobalStatus::InProgress);
        let DeclKind::Init(init) = self.program.ast.decl(decl).kind.clone() else {
            return Err(internal("global initialization is not an Init declaration"));
        };
        let ty = self.static_type(init.initializer)?;
        let slot = self.memory.allocate(ty);
        self.tasks.push(Task::FinishGlobal { decl });
        self.tasks.push(Task::BindPattern {
            pattern: init.pattern,
            addr: slot.clone(),
        });
        self.tasks.push(Task::Eval {
            expr: init.initializer,
            dest: Some(slot),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lvalues
    // -----------------------------------------------------------------------

    /// Address named by an assignment target. Produces no allocations.
    fn lvalue_address(&mut self, e: ExprId) -> Result<Address, RuntimeError> {
        let kind = self.program.ast.expr(e).kind.clone();
        match kind {
            ExprKind::Name(_) => {
                let Some(Def::Binding(b)) = self.program.resolution.definition.get(&e).cloned()
                else {
                    return Err(RuntimeError::Error(
                        "expression is not assignable".to_string(),
                    ));
                };
                self.frame()?
                    .locals
                    .get(&b)
                    .or_else(|| self.globals.get(&b))
                    .cloned()
                    .ok_or_else(|| internal("assignment target has no address"))
            }
            ExprKind::Member { base, member } => {
                let addr = self.lvalue_address(base)?;
                match self.memory.type_at(&addr)? {
                    Type::Struct(_) => Ok(addr.payload().field(FieldId::Label(member))),
                    Type::Tuple(_) => Ok(addr.field(FieldId::Label(member))),
                    other => Err(internal(format!(
                        "member assignment through value of type {}",
                        other
                    ))),
                }
            }
            ExprKind::Index { base, offset } => {
                let addr = self.lvalue_address(base)?;
                let Value::Int(n) = self.eval_atom(offset)? else {
                    return Err(internal("non-Int tuple index"));
                };
                if n < 0 {
                    return Err(RuntimeError::Error(format!(
                        "tuple has no value at position {}",
                        n
                    )));
                }
                Ok(addr.field(FieldId::Position(n as usize)))
            }
            _ => Err(RuntimeError::Error(
                "expression is not assignable".to_string(),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Runtime pattern matching
    // -----------------------------------------------------------------------

    /// Match `pattern` against the value of type `ty` stored at `addr`,
    /// binding variables into the current frame (or the global table).
    fn match_pattern(
        &mut self,
        pattern: PatternId,
        ty: &Type,
        addr: &Address,
    ) -> Result<bool, RuntimeError> {
        let kind = self.program.ast.pattern(pattern).kind.clone();
        match kind {
            PatternKind::Atom(e) => {
                let expected = self.eval_atom(e)?;
                let actual = self.memory.read(addr)?;
                Ok(expected.equals(&actual))
            }
            PatternKind::Variable(b) => {
                if self.program.resolution.globals.contains(&b) {
                    self.globals.insert(b, addr.clone());
                } else {
                    self.frame_mut()?.locals.insert(b, addr.clone());
                }
                Ok(true)
            }
            PatternKind::Tuple(fields) => {
                let Type::Tuple(tys) = ty else {
                    return Ok(false);
                };
                if !fields.congruent_to(tys) {
                    return Ok(false);
                }
                for field in fields.iter() {
                    let sub_ty = tys
                        .element(&field.id)
                        .cloned()
                        .ok_or_else(|| internal("congruent tuple missing a field"))?;
                    let sub = addr.field(field.id.clone());
                    if !self.match_pattern(field.value, &sub_ty, &sub)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            PatternKind::Call { callee, args } => match ty {
                Type::Choice(_) => {
                    let Value::Alternative {
                        index, payload, ..
                    } = self.eval_atom(callee)?
                    else {
                        return Err(internal("pattern callee is not an alternative"));
                    };
                    if self.memory.discriminant(addr)? != index {
                        return Ok(false);
                    }
                    let payload_addr = addr.payload();
                    for field in args.iter() {
                        let Some(sub_ty) = payload.element(&field.id).cloned() else {
                            return Ok(false);
                        };
                        let sub = payload_addr.field(field.id.clone());
                        if !self.match_pattern(field.value, &sub_ty, &sub)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Type::Struct(id) => {
                    let params = self.program.initializer_parameters(id.decl);
                    let payload_addr = addr.payload();
                    for field in args.iter() {
                        let Some(sub_ty) = params.element(&field.id).cloned() else {
                            return Ok(false);
                        };
                        let sub = payload_addr.field(field.id.clone());
                        if !self.match_pattern(field.value, &sub_ty, &sub)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                _ => Ok(false),
            },
            PatternKind::FunctionType { params, ret } => {
                let Value::Type(actual) = self.memory.read(addr)? else {
                    return Ok(false);
                };
                let mut param_tuple = TupleOf::new();
                for field in params.iter() {
                    let e = self.pattern_type_expr(field.value)?;
                    let Value::Type(t) = self.eval_atom(e)? else {
                        return Ok(false);
                    };
                    param_tuple.push(field.id.clone(), t);
                }
                let ret_expr = self.pattern_type_expr(ret)?;
                let Value::Type(ret_ty) = self.eval_atom(ret_expr)? else {
                    return Ok(false);
                };
                let expected = Type::Function {
                    params: param_tuple,
                    ret: Box::new(ret_ty),
                };
                Ok(expected == actual)
            }
        }
    }

    /// Evaluate a pattern atom without touching the work stack. Covers
    /// literals, names, member access, tuples, operators and tuple
    /// indexing; calls are not constant expressions.
    fn eval_atom(&mut self, e: ExprId) -> Result<Value, RuntimeError> {
        let kind = self.program.ast.expr(e).kind.clone();
        match kind {
            ExprKind::IntLit(n) => Ok(Value::Int(n)),
            ExprKind::BoolLit(b) => Ok(Value::Bool(b)),
            ExprKind::IntType => Ok(Value::Type(Type::Int)),
            ExprKind::BoolType => Ok(Value::Type(Type::Bool)),
            ExprKind::TypeType => Ok(Value::Type(Type::TypeT)),
            ExprKind::Name(_) => {
                let def = self
                    .program
                    .resolution
                    .definition
                    .get(&e)
                    .cloned()
                    .ok_or_else(|| internal("unresolved name survived resolution"))?;
                match def {
                    Def::Struct(d) => Ok(Value::Type(Type::Struct(self.program.nominal(d)))),
                    Def::Choice(d) => Ok(Value::Type(Type::Choice(self.program.nominal(d)))),
                    Def::Function(d) => {
                        let ty = self.static_type(e)?;
                        let name: Rc<str> = self
                            .program
                            .function(d)
                            .map(|f| Rc::from(f.name.as_str()))
                            .ok_or_else(|| internal("function definition missing"))?;
                        Ok(Value::Function { ty, decl: d, name })
                    }
                    Def::Binding(b) => {
                        let addr = self
                            .frame()?
                            .locals
                            .get(&b)
                            .or_else(|| self.globals.get(&b))
                            .cloned()
                            .ok_or_else(|| {
                                RuntimeError::Error(
                                    "global used before initialization in a pattern".to_string(),
                                )
                            })?;
                        Ok(self.memory.read(&addr)?)
                    }
                    _ => Err(internal("name denotes a nominal member outside its body")),
                }
            }
            ExprKind::Member { base, member } => {
                let base_value = self.eval_atom(base)?;
                match base_value {
                    Value::Type(Type::Choice(id)) => {
                        let index = self
                            .program
                            .find_alternative(id.decl, &member)
                            .ok_or_else(|| internal("alternative vanished after checking"))?;
                        let name = self
                            .program
                            .alternative_name(id.decl, index)
                            .ok_or_else(|| internal("alternative vanished after checking"))?;
                        let payload = self.program.alternative_payload(id.decl, index);
                        match self.static_type(e)? {
                            Type::Alternative { .. } => Ok(Value::Alternative {
                                choice: id,
                                index,
                                name,
                                payload,
                            }),
                            _ => Ok(Value::Choice {
                                id,
                                discriminant: index,
                                alternative: name,
                                payload: Box::new(Value::empty_tuple()),
                            }),
                        }
                    }
                    Value::Tuple(fields) => fields
                        .element(&FieldId::Label(member.clone()))
                        .cloned()
                        .ok_or_else(|| internal("tuple field vanished after checking")),
                    Value::Struct { payload, .. } => match payload.as_ref() {
                        Value::Tuple(fields) => fields
                            .element(&FieldId::Label(member.clone()))
                            .cloned()
                            .ok_or_else(|| internal("struct member vanished after checking")),
                        _ => Err(internal("struct payload is not a tuple")),
                    },
                    other => Err(RuntimeError::Error(format!(
                        "value {} has no members in a pattern",
                        other
                    ))),
                }
            }
            ExprKind::TupleLit(fields) => {
                let mut out = TupleOf::new();
                for field in fields.iter() {
                    out.push(field.id.clone(), self.eval_atom(field.value)?);
                }
                Ok(Value::Tuple(out))
            }
            ExprKind::Unary(op, operand) => {
                let v = self.eval_atom(operand)?;
                match (op, v) {
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| RuntimeError::Error("integer overflow".to_string())),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (_, other) => Err(internal(format!("bad unary operand {}", other))),
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lv = self.eval_atom(lhs)?;
                match (op, &lv) {
                    (BinaryOp::And, Value::Bool(false)) => Ok(Value::Bool(false)),
                    (BinaryOp::Or, Value::Bool(true)) => Ok(Value::Bool(true)),
                    _ => {
                        let rv = self.eval_atom(rhs)?;
                        match op {
                            BinaryOp::Add | BinaryOp::Sub => {
                                let (Value::Int(a), Value::Int(b)) = (&lv, &rv) else {
                                    return Err(internal("non-Int arithmetic operands"));
                                };
                                match op {
                                    BinaryOp::Add => a.checked_add(*b),
                                    _ => a.checked_sub(*b),
                                }
                                .map(Value::Int)
                                .ok_or_else(|| {
                                    RuntimeError::Error("integer overflow".to_string())
                                })
                            }
                            BinaryOp::Eq => Ok(Value::Bool(lv.equals(&rv))),
                            BinaryOp::And | BinaryOp::Or => Ok(rv),
                        }
                    }
                }
            }
            ExprKind::Index { base, offset } => {
                let base_value = self.eval_atom(base)?;
                let Value::Int(n) = self.eval_atom(offset)? else {
                    return Err(internal("non-Int tuple index"));
                };
                match base_value {
                    Value::Tuple(fields) if n >= 0 => fields
                        .element(&FieldId::Position(n as usize))
                        .cloned()
                        .ok_or_else(|| {
                            RuntimeError::Error(format!(
                                "tuple has no value at position {}",
                                n
                            ))
                        }),
                    _ => Err(RuntimeError::Error(format!(
                        "tuple has no value at position {}",
                        n
                    ))),
                }
            }
            ExprKind::FunctionType { params, ret } => {
                let mut param_tuple = TupleOf::new();
                for field in params.iter() {
                    let sub = self.pattern_type_expr(field.value)?;
                    let Value::Type(t) = self.eval_atom(sub)? else {
                        return Err(internal("non-type in function type position"));
                    };
                    param_tuple.push(field.id.clone(), t);
                }
                let ret_expr = self.pattern_type_expr(ret)?;
                let Value::Type(ret_ty) = self.eval_atom(ret_expr)? else {
                    return Err(internal("non-type in function type position"));
                };
                Ok(Value::Type(Type::Function {
                    params: param_tuple,
                    ret: Box::new(ret_ty),
                }))
            }
            ExprKind::Call { .. } => Err(RuntimeError::Error(
                "call expressions are not supported in patterns".to_string(),
            )),
        }
    }
}
