use sym::SymbolicValue;

use super::{emulate, init_tracing, instruction, process};
use crate::arch::Arch;
use crate::call::{CallDecision, CallPolicy, CallSite};
use crate::constraint::Constraint;
use crate::emulator::*;

fn register(emulator: &Emulator, name: &str) -> String {
    emulator.state().read_register(name).to_string()
}

#[test]
fn xor_zeroes_register() -> Result<()> {
    let emulator = emulate(Arch::Amd64, &["xor rdi, rdi"])?;
    assert!(emulator.state().read_register("rdi").is_zero());

    let emulator = emulate(Arch::I386, &["xor eax, eax"])?;
    assert!(emulator.state().read_register("eax").is_zero());
    Ok(())
}

#[test]
fn xor_32bit_alias() -> Result<()> {
    let emulator = emulate(Arch::Amd64, &["xor esi, esi", "xor r10d, r10d"])?;
    assert!(emulator.state().read_register("rsi").is_zero());
    assert!(emulator.state().read_register("r10").is_zero());
    Ok(())
}

#[test]
fn xor_alias_after_mov() -> Result<()> {
    let emulator = emulate(
        Arch::Amd64,
        &["mov eax, ebx", "xor eax, eax", "mov DWORD PTR [rsp+0x8], eax"],
    )?;
    assert!(emulator.state().read_register("rax").is_zero());
    assert!(emulator.state().read_register("eax").is_zero());
    assert!(emulator.state().read_stack(0x8).is_zero());
    Ok(())
}

#[test]
fn mov_full_register_after_alias() -> Result<()> {
    let emulator = emulate(Arch::Amd64, &["mov edi, 0x1", "mov rdi, rsi"])?;
    assert_eq!(register(&emulator, "edi"), "edi");
    assert_eq!(register(&emulator, "rdi"), "rsi");
    Ok(())
}

#[test]
fn xor_different_registers() {
    let err = emulate(Arch::Amd64, &["xor rax, rbx"]).expect_err("xor of distinct registers");
    assert!(matches!(
        err,
        Error::UnhandledInstruction {
            reason: UnhandledReason::NonSelfXor,
            ..
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn push_amd64() -> Result<()> {
    let mut emulator = Emulator::new(Arch::Amd64);
    process(&mut emulator, &["push rax"])?;
    assert_eq!(emulator.state().stack_pointer_offset()?, -8);
    process(&mut emulator, &["push 0x0"])?;
    assert_eq!(emulator.state().stack_pointer_offset()?, -16);

    assert_eq!(emulator.state().read_stack(-8).to_string(), "rax");
    assert!(emulator.state().read_stack(-16).is_zero());
    assert_eq!(register(&emulator, "rsp"), "rsp-0x10");
    Ok(())
}

#[test]
fn push_i386() -> Result<()> {
    let emulator = emulate(Arch::I386, &["push eax", "push DWORD PTR [esp+0x8]"])?;
    assert_eq!(emulator.state().stack_pointer_offset()?, -8);
    assert_eq!(emulator.state().read_stack(-4).to_string(), "eax");

    // The source is addressed before the stack pointer moves
    assert_eq!(emulator.state().read_stack(-8).to_string(), "[esp+0x4]");
    Ok(())
}

#[test]
fn push_stack_pointer() -> Result<()> {
    let emulator = emulate(Arch::Amd64, &["push rsp"])?;
    assert_eq!(emulator.state().read_stack(-8).to_string(), "rsp");
    Ok(())
}

#[test]
fn mov_through_stack() -> Result<()> {
    let emulator = emulate(
        Arch::Amd64,
        &["mov QWORD PTR [rsp+0x8], rax", "mov rbx, QWORD PTR [rsp+0x8]"],
    )?;
    assert_eq!(register(&emulator, "rbx"), "rax");
    assert!(emulator.constraints().is_empty());
    Ok(())
}

#[test]
fn mov_from_unwritten_stack() -> Result<()> {
    let emulator = emulate(Arch::Amd64, &["mov rax, QWORD PTR [rsp+0x70]"])?;
    assert_eq!(register(&emulator, "rax"), "[rsp+0x70]");
    Ok(())
}

#[test]
fn mov_follows_stack_pointer() -> Result<()> {
    let emulator = emulate(
        Arch::Amd64,
        &["sub rsp, 0x8", "mov QWORD PTR [rsp], rdi", "mov rsi, QWORD PTR [rsp+0x10]"],
    )?;
    assert_eq!(emulator.state().read_stack(-8).to_string(), "rdi");
    assert_eq!(register(&emulator, "rsi"), "[rsp+0x8]");
    Ok(())
}

#[test]
fn mov_immediate_and_memory() -> Result<()> {
    let emulator = emulate(
        Arch::Amd64,
        &["mov edx, 0x0", "mov rax, QWORD PTR [rip+0x1b3e28]", "mov rsi, QWORD PTR [rax]"],
    )?;
    assert!(emulator.state().read_register("edx").is_zero());
    assert_eq!(register(&emulator, "rax"), "[rip+0x1b3e28]");
    assert_eq!(register(&emulator, "rsi"), "[[rip+0x1b3e28]]");
    Ok(())
}

#[test]
fn mov_to_memory_requires_writable() -> Result<()> {
    let emulator = emulate(Arch::Amd64, &["mov QWORD PTR [rax+0x10], rbx"])?;
    assert_eq!(
        emulator.constraints(),
        &[Constraint::Writable(SymbolicValue::symbol("rax") + 0x10)]
    );
    assert_eq!(emulator.constraints()[0].to_string(), "writable(rax+0x10)");
    Ok(())
}

#[test]
fn mov_to_global_is_unconstrained() -> Result<()> {
    let emulator = emulate(Arch::Amd64, &["mov QWORD PTR [rip+0x2000], rbx"])?;
    assert!(emulator.constraints().is_empty());
    Ok(())
}

#[test]
fn mov_to_vector_register() {
    let err = emulate(Arch::Amd64, &["mov xmm0, rax"]).expect_err("vector destination");
    assert!(matches!(
        err,
        Error::UnhandledInstruction {
            reason: UnhandledReason::UnsupportedOperand { index: 0 },
            ..
        }
    ));
}

#[test]
fn lea() -> Result<()> {
    let emulator = emulate(
        Arch::Amd64,
        &["lea rdi, [rip+0x1b45c2]", "lea rsi, [rsp+0x30]", "lea rdx, [rax+rbx+0x8]"],
    )?;
    assert_eq!(register(&emulator, "rdi"), "rip+0x1b45c2");
    assert!(emulator.state().read_register("rdi").references("rip"));
    assert_eq!(register(&emulator, "rsi"), "rsp+0x30");
    assert_eq!(register(&emulator, "rdx"), "rax+rbx+0x8");
    Ok(())
}

#[test]
fn lea_of_register() {
    let err = emulate(Arch::Amd64, &["lea rdi, rax"]).expect_err("lea without memory operand");
    assert!(matches!(
        err,
        Error::UnhandledInstruction {
            reason: UnhandledReason::Reference(_),
            ..
        }
    ));
}

#[test]
fn add() -> Result<()> {
    let emulator = emulate(Arch::Amd64, &["add rsp, 0x18", "add rax, rbx"])?;
    assert_eq!(emulator.state().stack_pointer_offset()?, 0x18);
    assert_eq!(register(&emulator, "rax"), "rax+rbx");
    Ok(())
}

#[test]
fn sub() -> Result<()> {
    let emulator = emulate(Arch::I386, &["sub esp, 0xc"])?;
    assert_eq!(emulator.state().stack_pointer_offset()?, -0xc);
    Ok(())
}

#[test]
fn sub_symbolic() {
    let err = emulate(Arch::Amd64, &["sub rsp, rax"]).expect_err("symbolic subtrahend");
    assert!(matches!(
        err,
        Error::UnhandledInstruction {
            reason: UnhandledReason::SymbolicOperand { index: 1 },
            ..
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn corrupted_stack_pointer() {
    let err = emulate(Arch::Amd64, &["mov rsp, rax", "push rbx"]).expect_err("corrupted state");
    assert!(matches!(err, Error::CorruptedState(_)));
    assert!(err.is_fatal());
}

#[test]
fn unknown_opcode() {
    let err = emulate(Arch::Amd64, &["cmovne rax, rbx"]).expect_err("unknown opcode");
    assert!(matches!(
        err,
        Error::UnhandledInstruction {
            reason: UnhandledReason::UnknownOpcode,
            ..
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn arity() {
    let err = emulate(Arch::Amd64, &["push rax, rbx"]).expect_err("wrong arity");
    assert!(matches!(
        err,
        Error::UnhandledInstruction {
            reason: UnhandledReason::Arity { actual: 2, .. },
            ..
        }
    ));
}

#[test]
fn jmp_and_nop() -> Result<()> {
    let mut emulator = Emulator::new(Arch::Amd64);
    let flow = process(
        &mut emulator,
        &["jmp 0x4f322", "nop", "nop DWORD PTR [rax+0x0]"],
    )?;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(emulator.state().registers().count(), 0);
    assert!(emulator.constraints().is_empty());
    Ok(())
}

#[test]
fn terminal_call() -> Result<()> {
    for target in ["execve", "execl", "posix_spawn", "0x4f440 <execve>"] {
        let mut emulator = Emulator::new(Arch::Amd64);
        let flow = process(&mut emulator, &["mov rax, rbx", format!("call {target}").as_str()])?;
        assert_eq!(flow, Flow::Terminated(target.to_string()));
        assert_eq!(register(&emulator, "rip"), target);
        assert_eq!(emulator.program_counter().to_string(), target);
    }

    let emulator = emulate(Arch::I386, &["call execve"])?;
    assert_eq!(register(&emulator, "eip"), "execve");
    Ok(())
}

#[test]
fn benign_call() -> Result<()> {
    let mut emulator = Emulator::new(Arch::Amd64);
    let flow = process(&mut emulator, &["call sigprocmask"])?;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(emulator.state().registers().count(), 0);
    Ok(())
}

#[test]
fn unsetenv() -> Result<()> {
    let emulator = emulate(Arch::Amd64, &["lea rdi, [rip+0x15a2e5]", "call unsetenv"])?;
    assert!(emulator.constraints().is_empty());

    let err = emulate(Arch::Amd64, &["call unsetenv"]).expect_err("unresolved call");
    assert!(matches!(&err, Error::UnresolvedCall { target } if target == "unsetenv"));
    assert!(!err.is_fatal());
    Ok(())
}

#[test]
fn unsetenv_i386() -> Result<()> {
    emulate(
        Arch::I386,
        &["lea eax, [eip+0x1234]", "push eax", "call unsetenv"],
    )?;

    let err = emulate(Arch::I386, &["push ebx", "call unsetenv"]).expect_err("unresolved call");
    assert!(!err.is_fatal());
    Ok(())
}

#[test]
fn got_relative_global_i386() {
    let err = emulate(
        Arch::I386,
        &["lea eax, [ebx-0x5faa5]", "push eax", "call unsetenv"],
    )
    .expect_err("GOT relative address");
    assert!(matches!(err, Error::UnresolvedCall { .. }));

    let emulator = emulate(Arch::I386, &["mov DWORD PTR [ebx+0x10], eax"])
        .expect("store through GOT base");
    assert_eq!(
        emulator.constraints(),
        &[Constraint::Writable(SymbolicValue::symbol("ebx") + 0x10)]
    );
}

#[test]
fn run_stops_at_terminal_call() -> Result<()> {
    init_tracing();
    let instructions: Vec<_> = ["xor esi, esi", "call execve", "cmovne rax, rbx"]
        .into_iter()
        .map(instruction)
        .collect();

    let mut emulator = Emulator::new(Arch::Amd64);
    assert_eq!(emulator.run(&instructions)?, Some("execve".to_string()));

    let mut emulator = Emulator::new(Arch::Amd64);
    assert_eq!(emulator.run(&instructions[..1])?, None);
    Ok(())
}

/// Accepts every call as benign.
struct Permissive;

impl CallPolicy for Permissive {
    fn classify(&self, _target: &str, _site: &CallSite<'_>) -> CallDecision {
        CallDecision::Benign
    }
}

#[test]
fn custom_call_policy() -> Result<()> {
    init_tracing();
    let mut emulator = Emulator::with_policy(Arch::Amd64, Permissive);
    let flow = emulator.process(&instruction("call execve"))?;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(emulator.program_counter().to_string(), "rip");
    Ok(())
}
