// Coroutine library
// Implements: create, resume, yield, status, running, wrap,
// isyieldable, close
//
// These builtins never hold native stack across a suspension: they
// return a Dispatch and the machine performs the switch on its heap
// frames.

use crate::error::LuaResult;
use crate::eval::frame::{CoStatus, Frame};
use crate::eval::native::{Args, Dispatch};
use crate::eval::LuaInterp;
use crate::gc::LuaFunction;
use crate::lib_registry::LibraryModule;
use crate::stdlib::{bad_arg, check_any};
use crate::value::LuaValue;

pub fn create_coroutine_lib() -> LibraryModule {
    crate::lib_module!("coroutine", {
        "create" => co_create,
        "resume" => co_resume,
        "yield" => co_yield,
        "status" => co_status,
        "running" => co_running,
        "wrap" => co_wrap,
        "isyieldable" => co_isyieldable,
        "close" => co_close,
    })
}

fn co_create(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let body = check_any(l, &args, 1, "create")?;
    if !matches!(body, LuaValue::Function(_)) {
        return Err(bad_arg(l, 1, "create", "function", &body));
    }
    let co = l.new_coroutine(body);
    Ok(Dispatch::Return(vec![LuaValue::Thread(co)]))
}

fn co_resume(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let target = check_any(l, &args, 1, "resume")?;
    let Some(co) = target.as_thread() else {
        return Err(bad_arg(l, 1, "resume", "coroutine", &target));
    };
    let rest = args.into_values().split_off(1);
    Ok(Dispatch::Resume {
        co,
        args: rest,
        wrap: false,
    })
}

fn co_yield(_l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    Ok(Dispatch::Yield(args.into_values()))
}

fn co_status(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let target = check_any(l, &args, 1, "status")?;
    let Some(co) = target.as_thread() else {
        return Err(bad_arg(l, 1, "status", "coroutine", &target));
    };
    let status = match l.coroutine_status(co) {
        CoStatus::Running => "running",
        CoStatus::Suspended => "suspended",
        CoStatus::Normal => "normal",
        CoStatus::Dead => "dead",
    };
    let s = l.new_string_from(status);
    Ok(Dispatch::Return(vec![s]))
}

fn co_running(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let _ = args;
    let current = l.current_thread();
    Ok(Dispatch::Return(vec![
        LuaValue::Thread(current),
        LuaValue::Boolean(current == l.main_thread),
    ]))
}

fn co_wrap(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let body = check_any(l, &args, 1, "wrap")?;
    if !matches!(body, LuaValue::Function(_)) {
        return Err(bad_arg(l, 1, "wrap", "function", &body));
    }
    let co = l.new_coroutine(body);
    let wrapper =
        l.new_native_closure("wrapped_coroutine", wrap_call, vec![LuaValue::Thread(co)]);
    Ok(Dispatch::Return(vec![wrapper]))
}

/// The callable `coroutine.wrap` returns: resumes its captured thread,
/// propagating errors and returning results raw.
fn wrap_call(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let fid = args.callee.expect("wrapped coroutine without state");
    let co = {
        let LuaFunction::Native(n) = l.heap.function(fid) else {
            unreachable!()
        };
        match &n.upvalues[0] {
            LuaValue::Thread(t) => *t,
            _ => unreachable!(),
        }
    };
    Ok(Dispatch::Resume {
        co,
        args: args.into_values(),
        wrap: true,
    })
}

fn co_isyieldable(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let _ = args;
    let yieldable = l.current_thread() != l.main_thread
        && !l.frames.iter().any(|f| matches!(f, Frame::Boundary));
    Ok(Dispatch::Return(vec![LuaValue::Boolean(yieldable)]))
}

fn co_close(l: &mut LuaInterp, args: Args) -> LuaResult<Dispatch> {
    let target = check_any(l, &args, 1, "close")?;
    let Some(co) = target.as_thread() else {
        return Err(bad_arg(l, 1, "close", "coroutine", &target));
    };
    Ok(Dispatch::CloseCoroutine { co })
}
