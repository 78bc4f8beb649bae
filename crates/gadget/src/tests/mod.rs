mod emulator;

use crate::arch::Arch;
use crate::catalog::Instruction;
use crate::emulator::{Emulator, Flow, Result};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn instruction(line: &str) -> Instruction {
    line.parse()
        .unwrap_or_else(|err| panic!("failed to decode `{line}`: {err}"))
}

/// Process each line in order and return the flow of the last instruction.
pub fn process(emulator: &mut Emulator, lines: &[&str]) -> Result<Flow> {
    init_tracing();
    let mut flow = Flow::Continue;
    for line in lines {
        flow = emulator.process(&instruction(line))?;
    }

    Ok(flow)
}

pub fn emulate(arch: Arch, lines: &[&str]) -> Result<Emulator> {
    let mut emulator = Emulator::new(arch);
    process(&mut emulator, lines)?;
    Ok(emulator)
}
