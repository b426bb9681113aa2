//! Op execution: statements compile to continuation ops on the current
//! frame; this module is the single step function that interprets them.
//!
//! Conventions: ops are pushed in reverse execution order (the op stack
//! pops from the end). An expression list with a spread tail pushes the
//! tail with `multi = true` and everything else with `multi = false`.
//! Any step that needs a metamethod or iterator call pushes its
//! continuation first, then starts the call; results land back on the
//! value stack where the continuation expects them.

use std::rc::Rc;

use smol_str::SmolStr;

use crate::env::{Scope, VarAttrib};
use crate::error::LuaResult;
use crate::gc::{LuaClosure, LuaFunction};
use crate::syntax::ast::{BinOp, BlockId, Chunk, ExprId, ExprKind, StatId, StatKind, TableField};
use crate::value::{LuaTable, LuaValue, MetaMethod};

use super::dispatch::{ArithOutcome, IndexOutcome, NewIndexOutcome};
use super::frame::{NumForState, Op, RetMode, Transfer};
use super::LuaInterp;

impl LuaInterp {
    pub(crate) fn exec_op(&mut self, op: Op) -> LuaResult<()> {
        match op {
            Op::Block { block, idx } => self.exec_block_step(block, idx),
            Op::EnvPop { prev, closes } => self.unwind_env_pop(prev, closes, None),
            Op::Tbc { value } => self.unwind_tbc(value, None),
            Op::Local { stat, base } => self.exec_local(stat, base),
            Op::Assign { stat, base, next } => self.exec_assign(stat, base, next),
            Op::If { stat, arm } => self.exec_if(stat, arm),
            Op::While { stat } => self.exec_while(stat),
            Op::Repeat { stat, base_env } => self.exec_repeat(stat, base_env),
            Op::NumForPrep { stat, base } => self.exec_num_for_prep(stat, base),
            Op::NumForLoop { stat, state } => self.exec_num_for_loop(stat, state),
            Op::GenForPrep { stat, base } => self.exec_gen_for_prep(stat, base),
            Op::GenForCall {
                stat,
                func,
                state,
                control,
            } => self.exec_gen_for_call(stat, func, state, control),
            Op::GenForLoop {
                stat,
                func,
                state,
                base,
            } => self.exec_gen_for_loop(stat, func, state, base),
            Op::Return { stat: _, base } => {
                let vals = self.cur().vals.split_off(base as usize);
                self.transfer = Some(Transfer::Return(vals));
                Ok(())
            }
            Op::TailCall { base, line } => {
                let f = self.cur();
                f.line = line;
                let mut window = f.vals.split_off(base as usize);
                let func = if window.is_empty() {
                    LuaValue::Nil
                } else {
                    window.remove(0)
                };
                self.transfer = Some(Transfer::TailCall { func, args: window });
                Ok(())
            }
            Op::ResumeTransfer { transfer } => {
                self.transfer = Some(transfer);
                Ok(())
            }
            Op::Eval { expr, multi } => self.exec_expr(expr, multi),
            Op::Push { value } => {
                self.push_val(value);
                Ok(())
            }
            Op::Bin { op, line } => self.exec_bin(op, line),
            Op::And { rhs } => {
                let v = self.pop_val();
                if v.is_truthy() {
                    self.cur().ops.push(Op::Eval {
                        expr: rhs,
                        multi: false,
                    });
                } else {
                    self.push_val(v);
                }
                Ok(())
            }
            Op::Or { rhs } => {
                let v = self.pop_val();
                if v.is_truthy() {
                    self.push_val(v);
                } else {
                    self.cur().ops.push(Op::Eval {
                        expr: rhs,
                        multi: false,
                    });
                }
                Ok(())
            }
            Op::Un { op, line } => {
                self.cur().line = line;
                let a = self.pop_val();
                let outcome = self.unary_op(op, a)?;
                self.apply_arith_outcome(outcome, line)
            }
            Op::BoolResult { negate } => {
                let v = self.pop_val();
                self.push_val(LuaValue::Boolean(v.is_truthy() != negate));
                Ok(())
            }
            Op::Index { line } => {
                self.cur().line = line;
                let key = self.pop_val();
                let obj = self.pop_val();
                match self.resolve_index(obj, key)? {
                    IndexOutcome::Value(v) => {
                        self.push_val(v);
                        Ok(())
                    }
                    IndexOutcome::Call { func, obj, key } => {
                        self.begin_call(func, vec![obj, key], RetMode::One, line)
                    }
                }
            }
            Op::SelfLookup { name, line } => {
                self.cur().line = line;
                let obj = self.pop_val();
                let key = self.new_string(name.as_bytes());
                match self.resolve_index(obj.clone(), key)? {
                    IndexOutcome::Value(m) => {
                        self.push_val(m);
                        self.push_val(obj);
                        Ok(())
                    }
                    IndexOutcome::Call { func, obj: o, key } => {
                        self.cur().ops.push(Op::SelfPush { obj });
                        self.begin_call(func, vec![o, key], RetMode::One, line)
                    }
                }
            }
            Op::SelfPush { obj } => {
                self.push_val(obj);
                Ok(())
            }
            Op::Call { base, multi, line } => {
                let f = self.cur();
                f.line = line;
                let mut window = f.vals.split_off(base as usize);
                let func = if window.is_empty() {
                    LuaValue::Nil
                } else {
                    window.remove(0)
                };
                let ret = if multi { RetMode::All } else { RetMode::One };
                self.begin_call(func, window, ret, line)
            }
            Op::PopTo { base } => {
                self.cur().vals.truncate(base as usize);
                Ok(())
            }
            Op::TableItem { table, index } => {
                let v = self.pop_val();
                self.heap.table_mut(table).raw_set_int(index, v);
                Ok(())
            }
            Op::TableKeyed { table, line } => {
                self.cur().line = line;
                let v = self.pop_val();
                let k = self.pop_val();
                let key = self.table_key(&k)?;
                self.heap.table_mut(table).raw_set(key, v);
                Ok(())
            }
            Op::TableTail { table, index, base } => {
                let tail = self.cur().vals.split_off(base as usize);
                for (i, v) in tail.into_iter().enumerate() {
                    self.heap.table_mut(table).raw_set_int(index + i as i64, v);
                }
                Ok(())
            }
        }
    }

    // ===== blocks and statements =====

    fn exec_block_step(&mut self, block: BlockId, idx: u32) -> LuaResult<()> {
        let chunk = self.cur().chunk.clone();
        let stats = &chunk.block(block).stats;
        if (idx as usize) < stats.len() {
            let stat = stats[idx as usize];
            self.cur().ops.push(Op::Block {
                block,
                idx: idx + 1,
            });
            self.exec_stat(&chunk, stat)?;
        }
        Ok(())
    }

    fn exec_stat(&mut self, chunk: &Rc<Chunk>, stat_id: StatId) -> LuaResult<()> {
        let stat = chunk.stat(stat_id);
        self.cur().line = stat.line;
        match &stat.kind {
            StatKind::Local { names: _, exprs } => {
                let base = self.cur().vals.len() as u32;
                self.cur().ops.push(Op::Local {
                    stat: stat_id,
                    base,
                });
                self.push_expr_list(exprs);
                Ok(())
            }
            StatKind::Assign { targets, exprs } => {
                let base = self.cur().vals.len() as u32;
                self.cur().ops.push(Op::Assign {
                    stat: stat_id,
                    base,
                    next: 0,
                });
                self.push_expr_list(exprs);
                // Target sub-expressions evaluate before the values,
                // left to right.
                for &target in targets.iter().rev() {
                    if let ExprKind::Index { obj, key } = &chunk.expr(target).kind {
                        let f = self.cur();
                        f.ops.push(Op::Eval {
                            expr: *key,
                            multi: false,
                        });
                        f.ops.push(Op::Eval {
                            expr: *obj,
                            multi: false,
                        });
                    }
                }
                Ok(())
            }
            StatKind::Call(expr) => {
                let base = self.cur().vals.len() as u32;
                let f = self.cur();
                f.ops.push(Op::PopTo { base });
                f.ops.push(Op::Eval {
                    expr: *expr,
                    multi: true,
                });
                Ok(())
            }
            StatKind::Do(block) => {
                self.enter_block(*block);
                Ok(())
            }
            StatKind::While { cond, .. } => {
                let f = self.cur();
                f.ops.push(Op::While { stat: stat_id });
                f.ops.push(Op::Eval {
                    expr: *cond,
                    multi: false,
                });
                Ok(())
            }
            StatKind::Repeat { .. } => {
                let base_env = self.cur().env.clone();
                self.start_repeat_iteration(chunk, stat_id, base_env);
                Ok(())
            }
            StatKind::If { arms, .. } => {
                let f = self.cur();
                f.ops.push(Op::If {
                    stat: stat_id,
                    arm: 0,
                });
                f.ops.push(Op::Eval {
                    expr: arms[0].0,
                    multi: false,
                });
                Ok(())
            }
            StatKind::NumericFor {
                start, limit, step, ..
            } => {
                let base = self.cur().vals.len() as u32;
                let f = self.cur();
                f.ops.push(Op::NumForPrep {
                    stat: stat_id,
                    base,
                });
                match step {
                    Some(step) => f.ops.push(Op::Eval {
                        expr: *step,
                        multi: false,
                    }),
                    None => f.ops.push(Op::Push {
                        value: LuaValue::Integer(1),
                    }),
                }
                f.ops.push(Op::Eval {
                    expr: *limit,
                    multi: false,
                });
                f.ops.push(Op::Eval {
                    expr: *start,
                    multi: false,
                });
                Ok(())
            }
            StatKind::GenericFor { exprs, .. } => {
                let base = self.cur().vals.len() as u32;
                self.cur().ops.push(Op::GenForPrep {
                    stat: stat_id,
                    base,
                });
                self.push_expr_list(exprs);
                Ok(())
            }
            StatKind::LocalFunction { name, proto } => {
                // The box exists before the closure captures the scope,
                // so the function can call itself.
                let cell = self.heap.alloc_box(LuaValue::Nil);
                let env = self.cur().env.clone();
                env.declare(name.clone(), VarAttrib::Regular, cell);
                let fid = self.heap.alloc_function(LuaFunction::Lua(LuaClosure {
                    chunk: chunk.clone(),
                    proto: *proto,
                    env,
                }));
                self.heap.set_box_value(cell, LuaValue::Function(fid));
                Ok(())
            }
            StatKind::Return { exprs, tail_call } => {
                if *tail_call {
                    return self.push_tail_call(chunk, exprs[0], stat.line);
                }
                let base = self.cur().vals.len() as u32;
                self.cur().ops.push(Op::Return {
                    stat: stat_id,
                    base,
                });
                self.push_expr_list(exprs);
                Ok(())
            }
            StatKind::Break => {
                self.transfer = Some(Transfer::Break);
                Ok(())
            }
            StatKind::Goto(name) => {
                self.transfer = Some(Transfer::Goto(name.clone()));
                Ok(())
            }
            StatKind::Label(_) => Ok(()),
        }
    }

    /// Evaluate an expression list left-to-right; only the final
    /// expression may spread.
    fn push_expr_list(&mut self, exprs: &[ExprId]) {
        let f = self.cur();
        for (i, &e) in exprs.iter().enumerate().rev() {
            f.ops.push(Op::Eval {
                expr: e,
                multi: i == exprs.len() - 1,
            });
        }
    }

    fn enter_block(&mut self, block: BlockId) {
        let prev = self.cur().env.clone();
        let child = Scope::child(&prev);
        let f = self.cur();
        f.ops.push(Op::EnvPop { prev, closes: None });
        f.ops.push(Op::Block { block, idx: 0 });
        f.env = child;
    }

    /// Open a fresh per-iteration scope binding the loop variables,
    /// then run the body.
    fn start_loop_body(&mut self, block: BlockId, bindings: Vec<(SmolStr, LuaValue)>) {
        let prev = self.cur().env.clone();
        let child = Scope::child(&prev);
        for (name, value) in bindings {
            let cell = self.heap.alloc_box(value);
            child.declare(name, VarAttrib::Regular, cell);
        }
        let f = self.cur();
        f.ops.push(Op::EnvPop { prev, closes: None });
        f.ops.push(Op::Block { block, idx: 0 });
        f.env = child;
    }

    fn exec_local(&mut self, stat_id: StatId, base: u32) -> LuaResult<()> {
        let chunk = self.cur().chunk.clone();
        let StatKind::Local { names, .. } = &chunk.stat(stat_id).kind else {
            unreachable!()
        };
        let mut values = self.cur().vals.split_off(base as usize);
        values.resize(names.len(), LuaValue::Nil);
        let env = self.cur().env.clone();
        for ((name, attrib), value) in names.iter().zip(values) {
            if *attrib == VarAttrib::Close
                && value.is_truthy()
                && self.get_mm(&value, MetaMethod::Close).is_nil()
            {
                return Err(self.rt_error(format!(
                    "variable '{}' got a non-closable value (a {})",
                    name,
                    value.type_name()
                )));
            }
            let cell = self.heap.alloc_box(value);
            env.declare(name.clone(), *attrib, cell);
        }
        Ok(())
    }

    fn exec_assign(&mut self, stat_id: StatId, base: u32, next: u32) -> LuaResult<()> {
        let chunk = self.cur().chunk.clone();
        let StatKind::Assign { targets, .. } = &chunk.stat(stat_id).kind else {
            unreachable!()
        };
        // Layout on the value stack: two slots (object, key) per index
        // target, then the right-hand values.
        let mut offsets = Vec::with_capacity(targets.len());
        let mut slots = 0u32;
        for &t in targets.iter() {
            offsets.push(slots);
            if matches!(chunk.expr(t).kind, ExprKind::Index { .. }) {
                slots += 2;
            }
        }
        let vs = (base + slots) as usize;
        if next == 0 {
            let f = self.cur();
            let have = f.vals.len() - vs;
            if have < targets.len() {
                f.vals.resize(vs + targets.len(), LuaValue::Nil);
            } else {
                f.vals.truncate(vs + targets.len());
            }
        }
        for i in (next as usize)..targets.len() {
            let value = self.cur().vals[vs + i].clone();
            match &chunk.expr(targets[i]).kind {
                ExprKind::Name(name) => {
                    let env = self.cur().env.clone();
                    if let Some((cell, _)) = env.lookup(name) {
                        self.heap.set_box_value(cell, value);
                        continue;
                    }
                    // Global: `name` is `_ENV.name`.
                    let envval = self.env_value()?;
                    let key = self.new_string(name.as_bytes());
                    match self.resolve_newindex(envval, key, value)? {
                        NewIndexOutcome::Done => continue,
                        NewIndexOutcome::Call {
                            func,
                            obj,
                            key,
                            value,
                        } => {
                            return self.schedule_assign_call(
                                stat_id,
                                base,
                                i as u32 + 1,
                                func,
                                vec![obj, key, value],
                            );
                        }
                    }
                }
                ExprKind::Index { .. } => {
                    let off = (base + offsets[i]) as usize;
                    let obj = self.cur().vals[off].clone();
                    let key = self.cur().vals[off + 1].clone();
                    match self.resolve_newindex(obj, key, value)? {
                        NewIndexOutcome::Done => continue,
                        NewIndexOutcome::Call {
                            func,
                            obj,
                            key,
                            value,
                        } => {
                            return self.schedule_assign_call(
                                stat_id,
                                base,
                                i as u32 + 1,
                                func,
                                vec![obj, key, value],
                            );
                        }
                    }
                }
                _ => unreachable!("unassignable target survived parsing"),
            }
        }
        self.cur().vals.truncate(base as usize);
        Ok(())
    }

    fn schedule_assign_call(
        &mut self,
        stat: StatId,
        base: u32,
        next: u32,
        func: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<()> {
        let line = self.cur().line;
        let f = self.cur();
        f.ops.push(Op::Assign { stat, base, next });
        let popto = f.vals.len() as u32;
        f.ops.push(Op::PopTo { base: popto });
        self.begin_call(func, args, RetMode::All, line)
    }

    fn exec_if(&mut self, stat_id: StatId, arm: u32) -> LuaResult<()> {
        let chunk = self.cur().chunk.clone();
        let StatKind::If { arms, else_body } = &chunk.stat(stat_id).kind else {
            unreachable!()
        };
        let cond = self.pop_val();
        if cond.is_truthy() {
            self.enter_block(arms[arm as usize].1);
            return Ok(());
        }
        let next = arm as usize + 1;
        if next < arms.len() {
            let f = self.cur();
            f.ops.push(Op::If {
                stat: stat_id,
                arm: next as u32,
            });
            f.ops.push(Op::Eval {
                expr: arms[next].0,
                multi: false,
            });
        } else if let Some(else_block) = else_body {
            self.enter_block(*else_block);
        }
        Ok(())
    }

    fn exec_while(&mut self, stat_id: StatId) -> LuaResult<()> {
        let chunk = self.cur().chunk.clone();
        let StatKind::While { cond, body } = &chunk.stat(stat_id).kind else {
            unreachable!()
        };
        let v = self.pop_val();
        if v.is_truthy() {
            let f = self.cur();
            f.ops.push(Op::While { stat: stat_id });
            f.ops.push(Op::Eval {
                expr: *cond,
                multi: false,
            });
            self.enter_block(*body);
        }
        Ok(())
    }

    fn exec_repeat(&mut self, stat_id: StatId, base_env: Rc<Scope>) -> LuaResult<()> {
        let chunk = self.cur().chunk.clone();
        let v = self.pop_val();
        if !v.is_truthy() {
            self.start_repeat_iteration(&chunk, stat_id, base_env);
        }
        Ok(())
    }

    /// One `repeat` iteration: fresh scope, body, condition (inside the
    /// scope), scope pop, then the loop decision.
    fn start_repeat_iteration(
        &mut self,
        chunk: &Rc<Chunk>,
        stat_id: StatId,
        base_env: Rc<Scope>,
    ) {
        let StatKind::Repeat { body, cond } = &chunk.stat(stat_id).kind else {
            unreachable!()
        };
        let child = Scope::child(&base_env);
        let f = self.cur();
        f.ops.push(Op::Repeat {
            stat: stat_id,
            base_env: base_env.clone(),
        });
        f.ops.push(Op::EnvPop {
            prev: base_env,
            closes: None,
        });
        f.ops.push(Op::Eval {
            expr: *cond,
            multi: false,
        });
        f.ops.push(Op::Block {
            block: *body,
            idx: 0,
        });
        f.env = child;
    }

    // ===== numeric for =====

    fn exec_num_for_prep(&mut self, stat_id: StatId, base: u32) -> LuaResult<()> {
        let window = self.cur().vals.split_off(base as usize);
        let [start, limit, step] = window.try_into().expect("for-prep window");
        let all_int = matches!(
            (&start, &limit, &step),
            (
                LuaValue::Integer(_),
                LuaValue::Integer(_),
                LuaValue::Integer(_)
            )
        );
        let state = if all_int {
            let (i0, l, s) = (
                start.as_integer().unwrap(),
                limit.as_integer().unwrap(),
                step.as_integer().unwrap(),
            );
            if s == 0 {
                return Err(self.rt_error("'for' step is zero"));
            }
            let remaining = if s > 0 {
                if i0 > l {
                    0
                } else {
                    (l.wrapping_sub(i0) as u64) / (s as u64) + 1
                }
            } else if i0 < l {
                0
            } else {
                (i0.wrapping_sub(l) as u64) / s.unsigned_abs() + 1
            };
            NumForState::Int {
                next: i0,
                step: s,
                remaining,
            }
        } else {
            let nums = [
                (&start, "initial"),
                (&limit, "limit"),
                (&step, "step"),
            ];
            for (v, what) in nums {
                if v.as_number().is_none() {
                    return Err(
                        self.rt_error(format!("'for' {} value must be a number", what))
                    );
                }
            }
            let s = step.as_number().unwrap();
            if s == 0.0 {
                return Err(self.rt_error("'for' step is zero"));
            }
            NumForState::Float {
                next: start.as_number().unwrap(),
                limit: limit.as_number().unwrap(),
                step: s,
            }
        };
        self.cur().ops.push(Op::NumForLoop {
            stat: stat_id,
            state,
        });
        Ok(())
    }

    fn exec_num_for_loop(&mut self, stat_id: StatId, state: NumForState) -> LuaResult<()> {
        let chunk = self.cur().chunk.clone();
        let StatKind::NumericFor { var, body, .. } = &chunk.stat(stat_id).kind else {
            unreachable!()
        };
        let (value, next_state) = match state {
            NumForState::Int {
                next,
                step,
                remaining,
            } => {
                if remaining == 0 {
                    return Ok(());
                }
                (
                    LuaValue::Integer(next),
                    NumForState::Int {
                        next: next.wrapping_add(step),
                        step,
                        remaining: remaining - 1,
                    },
                )
            }
            NumForState::Float { next, limit, step } => {
                let more = if step > 0.0 { next <= limit } else { next >= limit };
                if !more {
                    return Ok(());
                }
                (
                    LuaValue::Float(next),
                    NumForState::Float {
                        next: next + step,
                        limit,
                        step,
                    },
                )
            }
        };
        self.cur().ops.push(Op::NumForLoop {
            stat: stat_id,
            state: next_state,
        });
        self.start_loop_body(*body, vec![(var.clone(), value)]);
        Ok(())
    }

    // ===== generic for =====

    fn exec_gen_for_prep(&mut self, stat_id: StatId, base: u32) -> LuaResult<()> {
        let mut window = self.cur().vals.split_off(base as usize);
        window.resize(4, LuaValue::Nil);
        let tbc = window.pop().unwrap();
        let control = window.pop().unwrap();
        let state = window.pop().unwrap();
        let func = window.pop().unwrap();
        if tbc.is_truthy() && self.get_mm(&tbc, MetaMethod::Close).is_nil() {
            return Err(self.rt_error(format!(
                "variable '(for state)' got a non-closable value (a {})",
                tbc.type_name()
            )));
        }
        let f = self.cur();
        f.ops.push(Op::Tbc { value: tbc });
        f.ops.push(Op::GenForCall {
            stat: stat_id,
            func,
            state,
            control,
        });
        Ok(())
    }

    fn exec_gen_for_call(
        &mut self,
        stat_id: StatId,
        func: LuaValue,
        state: LuaValue,
        control: LuaValue,
    ) -> LuaResult<()> {
        let line = self.cur().line;
        let base = self.cur().vals.len() as u32;
        self.cur().ops.push(Op::GenForLoop {
            stat: stat_id,
            func: func.clone(),
            state: state.clone(),
            base,
        });
        self.begin_call(func, vec![state, control], RetMode::All, line)
    }

    fn exec_gen_for_loop(
        &mut self,
        stat_id: StatId,
        func: LuaValue,
        state: LuaValue,
        base: u32,
    ) -> LuaResult<()> {
        let chunk = self.cur().chunk.clone();
        let StatKind::GenericFor { names, body, .. } = &chunk.stat(stat_id).kind else {
            unreachable!()
        };
        let mut results = self.cur().vals.split_off(base as usize);
        let first = results.first().cloned().unwrap_or(LuaValue::Nil);
        if first.is_nil() {
            // Loop over; the Tbc guard beneath closes on its way out.
            return Ok(());
        }
        self.cur().ops.push(Op::GenForCall {
            stat: stat_id,
            func,
            state,
            control: first,
        });
        results.resize(names.len(), LuaValue::Nil);
        let bindings = names
            .iter()
            .cloned()
            .zip(results)
            .collect::<Vec<_>>();
        self.start_loop_body(*body, bindings);
        Ok(())
    }

    // ===== expressions =====

    fn exec_expr(&mut self, expr_id: ExprId, multi: bool) -> LuaResult<()> {
        let chunk = self.cur().chunk.clone();
        let expr = chunk.expr(expr_id);
        match &expr.kind {
            ExprKind::Nil => {
                self.push_val(LuaValue::Nil);
                Ok(())
            }
            ExprKind::True => {
                self.push_val(LuaValue::Boolean(true));
                Ok(())
            }
            ExprKind::False => {
                self.push_val(LuaValue::Boolean(false));
                Ok(())
            }
            ExprKind::Integer(i) => {
                self.push_val(LuaValue::Integer(*i));
                Ok(())
            }
            ExprKind::Float(f) => {
                self.push_val(LuaValue::Float(*f));
                Ok(())
            }
            ExprKind::Str(bytes) => {
                let s = self.new_string(bytes);
                self.push_val(s);
                Ok(())
            }
            ExprKind::Vararg => {
                let varargs = self.cur().varargs.clone();
                if multi {
                    self.cur().vals.extend(varargs.iter().cloned());
                } else {
                    let first = varargs.first().cloned().unwrap_or(LuaValue::Nil);
                    self.push_val(first);
                }
                Ok(())
            }
            ExprKind::Name(name) => {
                let env = self.cur().env.clone();
                if let Some((cell, _)) = env.lookup(name) {
                    let v = self.heap.box_value(cell).clone();
                    self.push_val(v);
                    return Ok(());
                }
                let envval = self.env_value()?;
                let key = self.new_string(name.as_bytes());
                match self.resolve_index(envval, key)? {
                    IndexOutcome::Value(v) => {
                        self.push_val(v);
                        Ok(())
                    }
                    IndexOutcome::Call { func, obj, key } => {
                        self.begin_call(func, vec![obj, key], RetMode::One, expr.line)
                    }
                }
            }
            ExprKind::Paren(inner) => {
                self.cur().ops.push(Op::Eval {
                    expr: *inner,
                    multi: false,
                });
                Ok(())
            }
            ExprKind::Function(proto) => {
                let env = self.cur().env.clone();
                let fid = self.heap.alloc_function(LuaFunction::Lua(LuaClosure {
                    chunk: chunk.clone(),
                    proto: *proto,
                    env,
                }));
                self.push_val(LuaValue::Function(fid));
                Ok(())
            }
            ExprKind::Index { obj, key } => {
                let f = self.cur();
                f.ops.push(Op::Index { line: expr.line });
                f.ops.push(Op::Eval {
                    expr: *key,
                    multi: false,
                });
                f.ops.push(Op::Eval {
                    expr: *obj,
                    multi: false,
                });
                Ok(())
            }
            ExprKind::Call { func, args } => {
                let base = self.cur().vals.len() as u32;
                let f = self.cur();
                f.ops.push(Op::Call {
                    base,
                    multi,
                    line: expr.line,
                });
                for (i, &a) in args.iter().enumerate().rev() {
                    f.ops.push(Op::Eval {
                        expr: a,
                        multi: i == args.len() - 1,
                    });
                }
                f.ops.push(Op::Eval {
                    expr: *func,
                    multi: false,
                });
                Ok(())
            }
            ExprKind::MethodCall { obj, name, args } => {
                let base = self.cur().vals.len() as u32;
                let f = self.cur();
                f.ops.push(Op::Call {
                    base,
                    multi,
                    line: expr.line,
                });
                for (i, &a) in args.iter().enumerate().rev() {
                    f.ops.push(Op::Eval {
                        expr: a,
                        multi: i == args.len() - 1,
                    });
                }
                f.ops.push(Op::SelfLookup {
                    name: name.clone(),
                    line: expr.line,
                });
                f.ops.push(Op::Eval {
                    expr: *obj,
                    multi: false,
                });
                Ok(())
            }
            ExprKind::Table { fields } => self.exec_table_ctor(&chunk, expr_id, fields),
            ExprKind::Binary { op, lhs, rhs } => {
                let f = self.cur();
                match op {
                    BinOp::And => {
                        f.ops.push(Op::And { rhs: *rhs });
                        f.ops.push(Op::Eval {
                            expr: *lhs,
                            multi: false,
                        });
                    }
                    BinOp::Or => {
                        f.ops.push(Op::Or { rhs: *rhs });
                        f.ops.push(Op::Eval {
                            expr: *lhs,
                            multi: false,
                        });
                    }
                    _ => {
                        f.ops.push(Op::Bin {
                            op: *op,
                            line: expr.line,
                        });
                        f.ops.push(Op::Eval {
                            expr: *rhs,
                            multi: false,
                        });
                        f.ops.push(Op::Eval {
                            expr: *lhs,
                            multi: false,
                        });
                    }
                }
                Ok(())
            }
            ExprKind::Unary { op, operand } => {
                let f = self.cur();
                f.ops.push(Op::Un {
                    op: *op,
                    line: expr.line,
                });
                f.ops.push(Op::Eval {
                    expr: *operand,
                    multi: false,
                });
                Ok(())
            }
        }
    }

    fn exec_table_ctor(
        &mut self,
        chunk: &Rc<Chunk>,
        expr_id: ExprId,
        fields: &[TableField],
    ) -> LuaResult<()> {
        let line = chunk.expr(expr_id).line;
        let table = self.heap.alloc_table(LuaTable::new());
        let base = self.cur().vals.len() as u32;
        let total_items = fields
            .iter()
            .filter(|f| matches!(f, TableField::Item(_)))
            .count();
        let f = self.cur();
        f.ops.push(Op::Push {
            value: LuaValue::Table(table),
        });
        // Push field ops in reverse so they execute in source order.
        let mut item_no = total_items;
        for (fi, field) in fields.iter().enumerate().rev() {
            match field {
                TableField::Item(e) => {
                    let is_tail =
                        fi == fields.len() - 1 && chunk.expr(*e).kind.is_multi();
                    if is_tail {
                        f.ops.push(Op::TableTail {
                            table,
                            index: item_no as i64,
                            base,
                        });
                        f.ops.push(Op::Eval {
                            expr: *e,
                            multi: true,
                        });
                    } else {
                        f.ops.push(Op::TableItem {
                            table,
                            index: item_no as i64,
                        });
                        f.ops.push(Op::Eval {
                            expr: *e,
                            multi: false,
                        });
                    }
                    item_no -= 1;
                }
                TableField::Keyed { key, value } => {
                    f.ops.push(Op::TableKeyed { table, line });
                    f.ops.push(Op::Eval {
                        expr: *value,
                        multi: false,
                    });
                    f.ops.push(Op::Eval {
                        expr: *key,
                        multi: false,
                    });
                }
            }
        }
        Ok(())
    }

    fn push_tail_call(
        &mut self,
        chunk: &Rc<Chunk>,
        call_expr: ExprId,
        line: u32,
    ) -> LuaResult<()> {
        let base = self.cur().vals.len() as u32;
        match &chunk.expr(call_expr).kind {
            ExprKind::Call { func, args } => {
                let f = self.cur();
                f.ops.push(Op::TailCall { base, line });
                for (i, &a) in args.iter().enumerate().rev() {
                    f.ops.push(Op::Eval {
                        expr: a,
                        multi: i == args.len() - 1,
                    });
                }
                f.ops.push(Op::Eval {
                    expr: *func,
                    multi: false,
                });
            }
            ExprKind::MethodCall { obj, name, args } => {
                let f = self.cur();
                f.ops.push(Op::TailCall { base, line });
                for (i, &a) in args.iter().enumerate().rev() {
                    f.ops.push(Op::Eval {
                        expr: a,
                        multi: i == args.len() - 1,
                    });
                }
                f.ops.push(Op::SelfLookup {
                    name: name.clone(),
                    line,
                });
                f.ops.push(Op::Eval {
                    expr: *obj,
                    multi: false,
                });
            }
            _ => unreachable!("tail call flag on a non-call return"),
        }
        Ok(())
    }

    fn exec_bin(&mut self, op: BinOp, line: u32) -> LuaResult<()> {
        self.cur().line = line;
        let b = self.pop_val();
        let a = self.pop_val();
        let outcome = self.binary_op(op, a, b)?;
        self.apply_arith_outcome(outcome, line)
    }

    fn apply_arith_outcome(&mut self, outcome: ArithOutcome, line: u32) -> LuaResult<()> {
        match outcome {
            ArithOutcome::Value(v) => {
                self.push_val(v);
                Ok(())
            }
            ArithOutcome::Call {
                func,
                args,
                boolify,
            } => {
                if let Some(negate) = boolify {
                    self.cur().ops.push(Op::BoolResult { negate });
                }
                self.begin_call(func, args, RetMode::One, line)
            }
        }
    }

    /// The value of `_ENV` at the current position.
    pub(crate) fn env_value(&mut self) -> LuaResult<LuaValue> {
        let env = self.cur().env.clone();
        match env.lookup("_ENV") {
            Some((cell, _)) => Ok(self.heap.box_value(cell).clone()),
            None => Err(self.rt_error("no '_ENV' in scope")),
        }
    }
}
