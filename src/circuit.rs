//! Arithmetic circuits over a prime field.
//!
//! A [`Circuit`] is an arena: wires and gates are addressed by index, gates are stored in
//! topological order and never refer to the output of a later gate. Evaluation (plain or
//! secure) keeps the computed values in a separate table that is allocated per run, so a
//! compiled circuit is immutable and can be shared between concurrent evaluations.
//!
//! Circuits are put together with a [`CircuitBuilder`]:
//!
//! ```
//! use bgw_mpc::circuit::CircuitBuilder;
//! use bgw_mpc::field::Zp;
//!
//! let mut b = CircuitBuilder::new(61, ["x", "y"]);
//! let x = b.input(0)?;
//! let y = b.input(1)?;
//! let z = b.mul(x, y)?;
//! b.output(z)?;
//! let circuit = b.build()?;
//! assert_eq!(circuit.evaluate(&[Zp::new(61, 3), Zp::new(61, 4)])?, vec![Zp::new(61, 12)]);
//! # Ok::<(), bgw_mpc::circuit::Error>(())
//! ```
use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::field::{self, Zp};

/// Errors raised while building, validating or evaluating a circuit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The gate has the wrong number of operands for its operation.
    #[error("{op:?} gate cannot take {operands} operands")]
    InvalidArity {
        /// The gate's operation.
        op: Op,
        /// The number of operands given.
        operands: usize,
    },
    /// The wire does not exist in this circuit.
    #[error("unknown wire {0}")]
    UnknownWire(usize),
    /// The input index is beyond the declared inputs.
    #[error("unknown input {0}")]
    UnknownInput(usize),
    /// Input wires cannot be circuit outputs.
    #[error("input wire {0} cannot be an output")]
    InputAsOutput(usize),
    /// Constant wires cannot be circuit outputs.
    #[error("constant wire {0} cannot be an output")]
    ConstantOutput(usize),
    /// A gate reads a value that is only computed later.
    #[error("gate {gate} reads wire {wire} before it is computed")]
    ForwardReference {
        /// The offending gate.
        gate: usize,
        /// The wire that is not ready.
        wire: usize,
    },
    /// A gate divides by the constant zero.
    #[error("gate {gate} divides by the constant zero")]
    ConstantDivisionByZero {
        /// The offending gate.
        gate: usize,
    },
    /// The circuit has no outputs.
    #[error("the circuit has no outputs")]
    NoOutputs,
    /// The number of provided inputs does not match the circuit.
    #[error("expected {expected} inputs, found {actual}")]
    WrongInputCount {
        /// The number of inputs declared by the circuit.
        expected: usize,
        /// The number of inputs provided.
        actual: usize,
    },
    /// A field operation failed.
    #[error(transparent)]
    Field(#[from] field::Error),
}

/// Index of a wire in its circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WireId(pub usize);

/// Where the value of a wire comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireKind {
    /// The input with the given index.
    Input(usize),
    /// A fixed field element.
    Constant(Zp),
    /// The output of the gate with the given index.
    Internal(usize),
}

/// A wire, optionally tagged as a circuit output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    kind: WireKind,
    output: Option<usize>,
}

impl Wire {
    /// Where the wire's value comes from.
    pub fn kind(&self) -> WireKind {
        self.kind
    }

    /// True for constant wires.
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, WireKind::Constant(_))
    }

    /// The output index, if the wire is a circuit output.
    pub fn output_index(&self) -> Option<usize> {
        self.output
    }
}

/// The operation of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    /// Sum of all operands.
    Add,
    /// The first operand minus all others.
    Sub,
    /// Product of exactly two operands.
    Mul,
    /// Quotient of exactly two operands.
    Div,
}

/// A gate reading one or more wires and writing exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    op: Op,
    inputs: Vec<WireId>,
    output: WireId,
    prime: i64,
}

impl Gate {
    /// The gate's operation.
    pub fn op(&self) -> Op {
        self.op
    }

    /// The operand wires, in order.
    pub fn inputs(&self) -> &[WireId] {
        &self.inputs
    }

    /// The wire carrying the gate's result.
    pub fn output(&self) -> WireId {
        self.output
    }

    /// The modulus of the gate's field.
    pub fn prime(&self) -> i64 {
        self.prime
    }

    /// True for multiplications and divisions of two non-constant operands.
    ///
    /// Evaluated on shares, such a gate doubles the degree of the sharing polynomial, which
    /// has to be brought back down right after the gate.
    pub fn needs_degree_reduction(&self, circuit: &Circuit) -> bool {
        matches!(self.op, Op::Mul | Op::Div)
            && self.inputs.len() == 2
            && self
                .inputs
                .iter()
                .all(|w| circuit.wire(*w).is_some_and(|w| !w.is_constant()))
    }
}

/// Gates in topological order plus the wires connecting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    prime: i64,
    input_names: Vec<String>,
    wires: Vec<Wire>,
    gates: Vec<Gate>,
    outputs: Vec<WireId>,
}

impl Circuit {
    /// The modulus of the circuit's field.
    pub fn prime(&self) -> i64 {
        self.prime
    }

    /// The gates, in evaluation order.
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// All wires, indexed by [`WireId`].
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// The wire with the given id.
    pub fn wire(&self, id: WireId) -> Option<&Wire> {
        self.wires.get(id.0)
    }

    /// The output wires, ordered by output index.
    pub fn outputs(&self) -> &[WireId] {
        &self.outputs
    }

    /// The declared input names.
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// The number of inputs.
    pub fn input_count(&self) -> usize {
        self.input_names.len()
    }

    /// True if the circuit multiplies or divides, i.e. if a secure evaluation needs room for
    /// degree reduction.
    pub fn has_multiplication(&self) -> bool {
        self.gates
            .iter()
            .any(|g| matches!(g.op, Op::Mul | Op::Div))
    }

    /// Checks the structural invariants, e.g. of a deserialized circuit.
    pub fn validate(&self) -> Result<(), Error> {
        for (g, gate) in self.gates.iter().enumerate() {
            check_arity(gate.op, gate.inputs.len())?;
            for w in &gate.inputs {
                match self.wires.get(w.0).map(Wire::kind) {
                    None => return Err(Error::UnknownWire(w.0)),
                    Some(WireKind::Input(i)) if i >= self.input_count() => {
                        return Err(Error::UnknownInput(i));
                    }
                    Some(WireKind::Internal(source)) if source >= g => {
                        return Err(Error::ForwardReference { gate: g, wire: w.0 });
                    }
                    _ => {}
                }
            }
            let divisor = gate.inputs.get(1).and_then(|w| self.wire(*w)).map(Wire::kind);
            if let (Op::Div, Some(WireKind::Constant(c))) = (gate.op, divisor) {
                if c.is_zero() {
                    return Err(Error::ConstantDivisionByZero { gate: g });
                }
            }
            match self.wires.get(gate.output.0).map(Wire::kind) {
                Some(WireKind::Internal(source)) if source == g => {}
                _ => return Err(Error::UnknownWire(gate.output.0)),
            }
        }
        if self.outputs.is_empty() {
            return Err(Error::NoOutputs);
        }
        for (i, w) in self.outputs.iter().enumerate() {
            let wire = self.wires.get(w.0).ok_or(Error::UnknownWire(w.0))?;
            match wire.kind {
                WireKind::Input(_) => return Err(Error::InputAsOutput(w.0)),
                WireKind::Constant(_) => return Err(Error::ConstantOutput(w.0)),
                WireKind::Internal(_) if wire.output != Some(i) => {
                    return Err(Error::UnknownWire(w.0));
                }
                WireKind::Internal(_) => {}
            }
        }
        Ok(())
    }

    /// Evaluates the circuit on plain values.
    ///
    /// Division by a zero value yields zero, the same result as inverting with `x^(p-2)`.
    pub fn evaluate(&self, inputs: &[Zp]) -> Result<Vec<Zp>, Error> {
        self.validate()?;
        if inputs.len() != self.input_count() {
            return Err(Error::WrongInputCount {
                expected: self.input_count(),
                actual: inputs.len(),
            });
        }
        let mut values: Vec<Option<Zp>> = vec![None; self.wires.len()];
        for (g, gate) in self.gates.iter().enumerate() {
            let mut operands = Vec::with_capacity(gate.inputs.len());
            for w in &gate.inputs {
                let value = match self.wires[w.0].kind {
                    WireKind::Input(i) => Zp::new(self.prime, inputs[i].value()),
                    WireKind::Constant(c) => c,
                    WireKind::Internal(_) => values[w.0]
                        .ok_or(Error::ForwardReference { gate: g, wire: w.0 })?,
                };
                operands.push(value);
            }
            let result = match (gate.op, operands.as_slice()) {
                (Op::Add, [first, rest @ ..]) => rest.iter().fold(*first, |acc, v| acc + *v),
                (Op::Sub, [first, rest @ ..]) => rest.iter().fold(*first, |acc, v| acc - *v),
                (Op::Mul, [a, b]) => *a * *b,
                (Op::Div, [_, b]) if b.is_zero() => Zp::zero(self.prime),
                (Op::Div, [a, b]) => a.checked_div(*b)?,
                (op, operands) => {
                    return Err(Error::InvalidArity {
                        op,
                        operands: operands.len(),
                    });
                }
            };
            values[gate.output.0] = Some(result);
        }
        self.outputs
            .iter()
            .map(|w| {
                values[w.0].ok_or(Error::ForwardReference {
                    gate: self.gates.len(),
                    wire: w.0,
                })
            })
            .collect()
    }

    /// The single-input circuit computing `x^(p-2)`, the inverse of `x` (and `0` for `0`).
    pub fn inverse(prime: i64) -> Result<Self, Error> {
        let mut b = CircuitBuilder::new(prime, ["x"]);
        let x = b.input(0)?;
        let exponent = (prime - 2).max(1) as u64;
        let inv = b.pow(x, exponent)?;
        b.output(inv)?;
        b.build()
    }
}

fn check_arity(op: Op, operands: usize) -> Result<(), Error> {
    let ok = match op {
        Op::Add | Op::Sub => operands >= 1,
        Op::Mul | Op::Div => operands == 2,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidArity { op, operands })
    }
}

/// Incrementally builds a [`Circuit`], keeping it in topological order.
#[derive(Debug, Clone)]
pub struct CircuitBuilder {
    prime: i64,
    input_names: Vec<String>,
    input_wires: Vec<Option<WireId>>,
    wires: Vec<Wire>,
    gates: Vec<Gate>,
    outputs: Vec<WireId>,
}

impl CircuitBuilder {
    /// Starts a circuit over `Z/primeZ` with the given input names.
    pub fn new<S: Into<String>>(prime: i64, inputs: impl IntoIterator<Item = S>) -> Self {
        let input_names: Vec<String> = inputs.into_iter().map(Into::into).collect();
        Self {
            prime,
            input_wires: vec![None; input_names.len()],
            input_names,
            wires: vec![],
            gates: vec![],
            outputs: vec![],
        }
    }

    fn push_wire(&mut self, kind: WireKind) -> WireId {
        self.wires.push(Wire { kind, output: None });
        WireId(self.wires.len() - 1)
    }

    /// The wire carrying input `index`.
    pub fn input(&mut self, index: usize) -> Result<WireId, Error> {
        match self.input_wires.get(index) {
            None => Err(Error::UnknownInput(index)),
            Some(Some(w)) => Ok(*w),
            Some(None) => {
                let w = self.push_wire(WireKind::Input(index));
                self.input_wires[index] = Some(w);
                Ok(w)
            }
        }
    }

    /// A wire carrying a constant.
    pub fn constant(&mut self, value: i64) -> WireId {
        self.push_wire(WireKind::Constant(Zp::new(self.prime, value)))
    }

    /// Appends a gate and returns its output wire.
    pub fn gate(&mut self, op: Op, operands: &[WireId]) -> Result<WireId, Error> {
        check_arity(op, operands.len())?;
        if let Some(w) = operands.iter().find(|w| w.0 >= self.wires.len()) {
            return Err(Error::UnknownWire(w.0));
        }
        if op == Op::Div {
            if let WireKind::Constant(c) = self.wires[operands[1].0].kind {
                if c.is_zero() {
                    return Err(Error::ConstantDivisionByZero {
                        gate: self.gates.len(),
                    });
                }
            }
        }
        let output = self.push_wire(WireKind::Internal(self.gates.len()));
        self.gates.push(Gate {
            op,
            inputs: operands.to_vec(),
            output,
            prime: self.prime,
        });
        Ok(output)
    }

    /// `a + b`.
    pub fn add(&mut self, a: WireId, b: WireId) -> Result<WireId, Error> {
        self.gate(Op::Add, &[a, b])
    }

    /// `a - b`.
    pub fn sub(&mut self, a: WireId, b: WireId) -> Result<WireId, Error> {
        self.gate(Op::Sub, &[a, b])
    }

    /// `a * b`.
    pub fn mul(&mut self, a: WireId, b: WireId) -> Result<WireId, Error> {
        self.gate(Op::Mul, &[a, b])
    }

    /// `a / b`.
    pub fn div(&mut self, a: WireId, b: WireId) -> Result<WireId, Error> {
        self.gate(Op::Div, &[a, b])
    }

    /// `base^exponent` by square-and-multiply.
    pub fn pow(&mut self, base: WireId, exponent: u64) -> Result<WireId, Error> {
        if exponent == 0 {
            return Ok(self.constant(1));
        }
        let mut acc = base;
        for bit in (0..63 - exponent.leading_zeros()).rev() {
            acc = self.mul(acc, acc)?;
            if exponent >> bit & 1 == 1 {
                acc = self.mul(acc, base)?;
            }
        }
        if acc == base {
            acc = self.gate(Op::Add, &[base])?;
        }
        Ok(acc)
    }

    /// `1` if `a == c`, else `0` (using `(a - c)^(p-1)`).
    pub fn equals_constant(&mut self, a: WireId, c: i64) -> Result<WireId, Error> {
        let c = self.constant(c);
        let diff = self.sub(a, c)?;
        let is_different = self.pow(diff, (self.prime - 1) as u64)?;
        let one = self.constant(1);
        self.sub(one, is_different)
    }

    /// `a` if `condition` is `1`, `b` if it is `0`.
    pub fn select(&mut self, condition: WireId, a: WireId, b: WireId) -> Result<WireId, Error> {
        let one = self.constant(1);
        let if_true = self.mul(condition, a)?;
        let negated = self.sub(one, condition)?;
        let if_false = self.mul(negated, b)?;
        self.add(if_true, if_false)
    }

    /// Tags the wire as the next circuit output and returns its output index.
    pub fn output(&mut self, wire: WireId) -> Result<usize, Error> {
        let next = self.outputs.len();
        let w = self.wires.get_mut(wire.0).ok_or(Error::UnknownWire(wire.0))?;
        match w.kind {
            WireKind::Input(_) => Err(Error::InputAsOutput(wire.0)),
            WireKind::Constant(_) => Err(Error::ConstantOutput(wire.0)),
            WireKind::Internal(_) => match w.output {
                Some(index) => Ok(index),
                None => {
                    w.output = Some(next);
                    self.outputs.push(wire);
                    Ok(next)
                }
            },
        }
    }

    /// Finishes the circuit.
    pub fn build(self) -> Result<Circuit, Error> {
        let circuit = Circuit {
            prime: self.prime,
            input_names: self.input_names,
            wires: self.wires,
            gates: self.gates,
            outputs: self.outputs,
        };
        circuit.validate()?;
        Ok(circuit)
    }
}

/// Memoized inverse circuits, keyed by prime.
#[derive(Debug, Default, Clone)]
pub struct InverseCircuits {
    circuits: HashMap<i64, Arc<Circuit>>,
}

impl InverseCircuits {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The inverse circuit for `prime`, built on first use.
    pub fn get_or_build(&mut self, prime: i64) -> Result<Arc<Circuit>, Error> {
        if let Some(circuit) = self.circuits.get(&prime) {
            return Ok(Arc::clone(circuit));
        }
        let circuit = Arc::new(Circuit::inverse(prime)?);
        self.circuits.insert(prime, Arc::clone(&circuit));
        Ok(circuit)
    }
}
