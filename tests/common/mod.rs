use symbolic_gadget::arch::Arch;
use symbolic_gadget::catalog::Instruction;
use symbolic_gadget::emulator::{Emulator, Error};

/// A one-gadget candidate as listed by a disassembler: one instruction per line, optionally
/// prefixed by its address, e.g. `4f2c5: lea rsi,[rsp+0x40]`.
pub struct Candidate {
    pub arch: Arch,
    pub instructions: Vec<Instruction>,
}

impl Candidate {
    pub fn new(arch: Arch, listing: &str) -> Self {
        let instructions = listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let line = match line.split_once(':') {
                    Some((address, rest))
                        if address.chars().all(|c| c.is_ascii_hexdigit()) =>
                    {
                        rest
                    }
                    _ => line,
                };

                line.parse()
                    .unwrap_or_else(|err| panic!("failed to decode `{line}`: {err}"))
            })
            .collect();

        Self { arch, instructions }
    }

    /// Evaluate the candidate from a fresh state. Returns the emulator and the terminal call
    /// target, if one was reached.
    pub fn evaluate(&self) -> Result<(Emulator, Option<String>), Error> {
        init_tracing();
        let mut emulator = Emulator::new(self.arch);
        let target = emulator.run(&self.instructions)?;
        Ok((emulator, target))
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
