//! Abstract circuit pages handed to the execution backend.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

/// Gate on virtual qubit indices of a page register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    X(usize),
    H(usize),
    /// Controlled-X as `(control, target)`.
    Cx(usize, usize),
    Swap(usize, usize),
    Id(usize),
}

impl Gate {
    fn qasm(self) -> String {
        match self {
            Gate::X(q) => format!("x q[{q}];"),
            Gate::H(q) => format!("h q[{q}];"),
            Gate::Cx(c, t) => format!("cx q[{c}],q[{t}];"),
            Gate::Swap(a, b) => format!("swap q[{a}],q[{b}];"),
            Gate::Id(q) => format!("id q[{q}];"),
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::X(q) => write!(f, "X {q}"),
            Gate::H(q) => write!(f, "H {q}"),
            Gate::Cx(c, t) => write!(f, "CX {c} {t}"),
            Gate::Swap(a, b) => write!(f, "SWAP {a} {b}"),
            Gate::Id(q) => write!(f, "ID {q}"),
        }
    }
}

/// A unit of backend work holding the gates of a contiguous block of runs.
///
/// Sealing appends the final measure-all readout; a sealed page is never
/// modified again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitPage {
    index: usize,
    width: usize,
    gates: Vec<Gate>,
    runs: usize,
    sealed: bool,
}

impl CircuitPage {
    pub fn new(index: usize, width: usize) -> Self {
        Self {
            index,
            width,
            gates: Vec::new(),
            runs: 0,
            sealed: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Register width (qubits and classical bits).
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Number of runs encoded on this page.
    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn push(&mut self, gate: Gate) {
        debug_assert!(!self.sealed, "gate pushed onto sealed page {}", self.index);
        self.gates.push(gate);
    }

    pub(crate) fn mark_run(&mut self) {
        self.runs += 1;
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn renumber(&mut self, index: usize) {
        self.index = index;
    }

    /// Render as OpenQASM 2.0 with a trailing barrier and measure-all.
    pub fn to_qasm(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(out, "OPENQASM 2.0;");
        let _ = writeln!(out, "include \"qelib1.inc\";");
        let _ = writeln!(out, "qreg q[{}];", self.width);
        let _ = writeln!(out, "creg meas[{}];", self.width);
        for gate in &self.gates {
            let _ = writeln!(out, "{}", gate.qasm());
        }
        if self.sealed {
            let _ = writeln!(out, "barrier q;");
            let _ = writeln!(out, "measure q -> meas;");
        }
        out
    }
}

impl fmt::Display for CircuitPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "circuit {} ({} qubits, {} runs, {} gates)",
            self.index,
            self.width,
            self.runs,
            self.gates.len()
        )?;
        for gate in &self.gates {
            writeln!(f, "  {gate}")?;
        }
        if self.sealed {
            writeln!(f, "  MEASURE ALL")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> CircuitPage {
        let mut p = CircuitPage::new(0, 4);
        p.push(Gate::H(0));
        p.push(Gate::Cx(0, 1));
        p.push(Gate::Swap(1, 2));
        p.mark_run();
        p.seal();
        p
    }

    #[test]
    fn test_qasm_rendering() {
        let qasm = page().to_qasm();
        let lines: Vec<&str> = qasm.lines().collect();
        assert_eq!(lines[0], "OPENQASM 2.0;");
        assert_eq!(lines[2], "qreg q[4];");
        assert!(lines.contains(&"cx q[0],q[1];"));
        assert!(lines.contains(&"swap q[1],q[2];"));
        assert_eq!(*lines.last().unwrap(), "measure q -> meas;");
    }

    #[test]
    fn test_unsealed_page_has_no_readout() {
        let mut p = CircuitPage::new(1, 2);
        p.push(Gate::X(0));
        assert!(!p.to_qasm().contains("measure"));
        assert!(!p.to_string().contains("MEASURE"));
    }

    #[test]
    fn test_display_summary_line() {
        let text = page().to_string();
        assert!(text.starts_with("circuit 0 (4 qubits, 1 runs, 3 gates)"));
        assert!(text.contains("  CX 0 1"));
    }

    #[test]
    fn test_gate_json_shape() {
        assert_eq!(serde_json::to_string(&Gate::Swap(2, 3)).unwrap(), r#"{"swap":[2,3]}"#);
        assert_eq!(serde_json::to_string(&Gate::H(1)).unwrap(), r#"{"h":1}"#);
    }
}
