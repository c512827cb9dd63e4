//! Stackful coroutine primitive the scheduler runs jobs on.
//!
//! This is a thin wrapper over the `context` crate's Boost.Context-style
//! asymmetric context switch, arranged to behave like the ucontext/Windows
//! fiber API the original engine targets: `switch_to(out_prev, next)`
//! saves the *calling* fiber's continuation into `out_prev` and transfers
//! control into `next`, exactly like `swapcontext`.
//!
//! `context::Context` carries no stack of its own after construction (it
//! is effectively a saved stack pointer); the backing
//! [`ProtectedFixedSizeStack`] must be kept alive independently for as
//! long as the fiber might still be resumed. [`FiberDecl`] in
//! [`crate::job::fiber_pool`] is that owner: it holds the stack for the
//! lifetime of the pool slot and only ever moves the lightweight [`Fiber`]
//! handle around during switches.

use context::stack::ProtectedFixedSizeStack;
use context::{Context, Transfer};
use std::ptr;

pub type FiberProc = extern "C" fn(*mut ());

pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// A lightweight, movable handle to a suspended or not-yet-started
/// coroutine. Does not own the stack -- see the module docs.
pub struct Fiber {
    ctx: Option<Context>,
    /// Set only on a freshly created fiber that has never run. Consumed by
    /// the first [`switch_to`] call that targets it, which is the one
    /// activation where the target's trampoline (rather than a resume
    /// point inside its own earlier `switch_to` call) is what receives the
    /// switch data -- see the module docs.
    pending_init: Option<*mut InitPayload>,
}

// SAFETY: a `Context` is a saved stack pointer plus the callee-saved
// register file; it contains no thread-affine state. The scheduler's
// `System.mutex` invariant (every switch happens with the mutex held,
// released by the destination as its first action) guarantees a given
// `Fiber` is never resumed from two threads concurrently, which is the
// only precondition Boost.Context-style switching imposes.
unsafe impl Send for Fiber {}

impl Default for Fiber {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Fiber {
    /// An empty handle, equivalent to the original's `INVALID_FIBER`.
    pub const fn invalid() -> Self {
        Self {
            ctx: None,
            pending_init: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.ctx.is_some()
    }
}

/// Owns the memory a [`Fiber`] runs on. Kept separate from `Fiber` itself
/// so that moving a `Fiber` handle between pool slots during a switch can
/// never accidentally drop (and unmap) a stack that is actively in use.
pub struct FiberStack(#[allow(dead_code)] ProtectedFixedSizeStack);

struct InitPayload {
    entry: FiberProc,
    param: *mut (),
    out_prev: usize,
}

// SAFETY: the payload is handed across the context switch, not shared;
// at any instant it is owned by exactly one stack of execution.
unsafe impl Send for InitPayload {}

extern "C" fn trampoline(t: Transfer) -> ! {
    let payload = unsafe { Box::from_raw(t.data as *mut InitPayload) };
    stash_continuation(payload.out_prev, t.context);
    (payload.entry)(payload.param);
    unreachable!("fiber entry function returned instead of switching away");
}

fn stash_continuation(out_prev_addr: usize, ctx: Context) {
    if out_prev_addr != 0 {
        let slot = out_prev_addr as *mut Fiber;
        unsafe {
            (*slot).ctx = Some(ctx);
        }
    }
}

/// Allocates a stack and prepares a fiber whose body is `entry(param)`.
/// The fiber does not start running until it is switched into.
pub fn create(stack_size: usize, entry: FiberProc, param: *mut ()) -> (Fiber, FiberStack) {
    let stack = ProtectedFixedSizeStack::new(stack_size.max(4096))
        .expect("failed to reserve fiber stack");
    let ctx = unsafe { Context::new(&stack, trampoline) };
    let payload = Box::into_raw(Box::new(InitPayload {
        entry,
        param,
        out_prev: 0,
    }));
    (
        Fiber {
            ctx: Some(ctx),
            pending_init: Some(payload),
        },
        FiberStack(stack),
    )
}

/// Saves the calling fiber's continuation into `out_prev` and switches
/// into `next`. Returns once some other fiber switches back into
/// `out_prev`'s slot.
///
/// `out_prev` must remain at a stable address for the duration of the
/// switch (it is always a field of a long-lived [`crate::job::fiber_pool::FiberDecl`]
/// or a stack-local in the scheduler's own control flow, never a
/// temporary).
pub fn switch_to(out_prev: &mut Fiber, mut next: Fiber) {
    let ctx = next.ctx.expect("switch_to: target fiber is invalid");
    let out_prev_addr = out_prev as *mut Fiber as usize;
    let data = match next.pending_init.take() {
        Some(payload) => {
            unsafe { (*payload).out_prev = out_prev_addr };
            payload as usize
        }
        None => out_prev_addr,
    };
    let transfer = unsafe { ctx.resume(data) };
    stash_continuation(out_prev_addr, transfer.context);
}

/// Converts the calling OS thread into a "primary" fiber and immediately
/// switches into a freshly created fiber running `entry(null)`. Returns
/// once that fiber (or anything it later switches to) switches back into
/// the returned primary handle -- i.e. this call blocks for the lifetime
/// of everything spawned from `entry`.
pub fn init_thread(entry: FiberProc) -> (Fiber, FiberStack) {
    let (fiber, stack) = create(DEFAULT_STACK_SIZE, entry, ptr::null_mut());
    let mut primary = Fiber::invalid();
    switch_to(&mut primary, fiber);
    (primary, stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TRACE: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn ping_entry(param: *mut ()) {
        // `param` carries the address of the caller's slot, which by the
        // time we run already holds the continuation `switch_to` stashed
        // on its way in -- so we can switch straight back to it.
        TRACE.fetch_add(1, Ordering::SeqCst);
        let caller_slot = param as *mut Fiber;
        let mut self_slot = Fiber::invalid();
        unsafe {
            switch_to(&mut self_slot, std::mem::replace(&mut *caller_slot, Fiber::invalid()));
        }
        unreachable!();
    }

    #[test]
    fn create_and_switch_round_trips() {
        TRACE.store(0, Ordering::SeqCst);
        let mut caller_slot = Fiber::invalid();
        let caller_addr = &mut caller_slot as *mut Fiber as *mut ();
        let (fiber, _stack) = create(DEFAULT_STACK_SIZE, ping_entry, caller_addr);
        switch_to(&mut caller_slot, fiber);
        assert_eq!(TRACE.load(Ordering::SeqCst), 1);
    }
}
