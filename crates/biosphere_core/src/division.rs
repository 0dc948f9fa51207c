//! Splitting a mother subtree into two daughters.
//!
//! Every leaf must name a divider. Quantities split so that the daughters
//! sum to the mother; the only randomness is which daughter receives the odd
//! unit of an integer, drawn from the engine's seeded RNG.

use crate::error::StructuralError;
use crate::registry::Registry;
use crate::store::Subtree;
use biosphere_data::{DividerKind, Path, Value};
use rand::Rng;
use std::collections::BTreeMap;

/// Phylogeny keys of the two daughters of `mother`.
#[must_use]
pub fn daughter_keys(mother: &str) -> [String; 2] {
    [format!("{mother}0"), format!("{mother}1")]
}

/// Divides `subtree`, the state of `mother`, into two daughter subtrees.
pub fn divide<R: Rng + ?Sized>(
    mother: &Path,
    subtree: &Subtree,
    registry: &Registry,
    rng: &mut R,
) -> Result<[Subtree; 2], StructuralError> {
    divide_node(mother, mother, subtree, registry, rng)
}

fn divide_node<R: Rng + ?Sized>(
    mother: &Path,
    at: &Path,
    node: &Subtree,
    registry: &Registry,
    rng: &mut R,
) -> Result<[Subtree; 2], StructuralError> {
    match node {
        Subtree::Branch {
            children,
            structural,
        } => {
            let mut first = BTreeMap::new();
            let mut second = BTreeMap::new();
            for (key, child) in children {
                let [a, b] = divide_node(mother, &at.child(key), child, registry, rng)?;
                first.insert(key.clone(), a);
                second.insert(key.clone(), b);
            }
            Ok([
                Subtree::Branch {
                    children: first,
                    structural: *structural,
                },
                Subtree::Branch {
                    children: second,
                    structural: *structural,
                },
            ])
        }
        Subtree::Leaf {
            schema,
            value,
            origin,
        } => {
            let divider = schema
                .divider
                .as_ref()
                .ok_or_else(|| StructuralError::MissingDivider {
                    mother: mother.clone(),
                    path: at.clone(),
                })?;
            // An unwritten leaf divides its default; only a required leaf
            // has no effective value.
            let effective = value
                .clone()
                .or_else(|| (!schema.required).then(|| schema.default.clone()));
            let [a, b] = match effective {
                Some(value) => {
                    let [a, b] = divide_value(at, divider, &value, registry, rng)?;
                    [Some(a), Some(b)]
                }
                None => [None, None],
            };
            let leaf = |value| Subtree::Leaf {
                schema: schema.clone(),
                value,
                origin: *origin,
            };
            Ok([leaf(a), leaf(b)])
        }
    }
}

fn failed(path: &Path, reason: impl Into<String>) -> StructuralError {
    StructuralError::DivideFailed {
        path: path.clone(),
        reason: reason.into(),
    }
}

/// Applies one divider to a leaf value.
pub fn divide_value<R: Rng + ?Sized>(
    path: &Path,
    divider: &DividerKind,
    value: &Value,
    registry: &Registry,
    rng: &mut R,
) -> Result<[Value; 2], StructuralError> {
    match divider {
        DividerKind::Set => Ok([value.clone(), value.clone()]),
        DividerKind::Zero => {
            let zero = zero_like(value);
            Ok([zero.clone(), zero])
        }
        DividerKind::Split => split(path, value, rng),
        DividerKind::SplitMap => {
            let map = value
                .as_map()
                .ok_or_else(|| failed(path, format!("split_map on a {}", value.kind())))?;
            let mut first = map.clone();
            let second = match map.keys().nth(map.len() / 2) {
                Some(key) => first.split_off(key),
                None => BTreeMap::new(),
            };
            Ok([Value::Map(first), Value::Map(second)])
        }
        DividerKind::Custom(name) => {
            let divider = registry
                .divider(name)
                .ok_or_else(|| failed(path, format!("no divider named {name:?}")))?;
            divider(value).map_err(|err| failed(path, err.to_string()))
        }
    }
}

fn split<R: Rng + ?Sized>(path: &Path, value: &Value, rng: &mut R) -> Result<[Value; 2], StructuralError> {
    match value {
        Value::Float(x) if x.is_infinite() => Ok([Value::Float(*x), Value::Float(*x)]),
        Value::Float(x) => Ok([Value::Float(x / 2.0), Value::Float(x / 2.0)]),
        Value::Int(n) => {
            let half = n.div_euclid(2);
            let odd = n.rem_euclid(2);
            if odd == 0 {
                Ok([Value::Int(half), Value::Int(half)])
            } else if rng.gen_bool(0.5) {
                Ok([Value::Int(half + odd), Value::Int(half)])
            } else {
                Ok([Value::Int(half), Value::Int(half + odd)])
            }
        }
        Value::Array(xs) => {
            let halves: Vec<f64> = xs
                .iter()
                .map(|x| if x.is_infinite() { *x } else { x / 2.0 })
                .collect();
            Ok([Value::Array(halves.clone()), Value::Array(halves)])
        }
        Value::Map(map) => {
            let mut first = BTreeMap::new();
            let mut second = BTreeMap::new();
            for (key, inner) in map {
                let [a, b] = split(&path.child(key), inner, rng)?;
                first.insert(key.clone(), a);
                second.insert(key.clone(), b);
            }
            Ok([Value::Map(first), Value::Map(second)])
        }
        Value::Bool(_) | Value::Text(_) => Err(failed(path, format!("cannot split a {}", value.kind()))),
    }
}

fn zero_like(value: &Value) -> Value {
    match value {
        Value::Float(_) => Value::Float(0.0),
        Value::Int(_) => Value::Int(0),
        Value::Bool(_) => Value::Bool(false),
        Value::Text(_) => Value::Text(String::new()),
        Value::Array(xs) => Value::Array(vec![0.0; xs.len()]),
        Value::Map(map) => Value::Map(map.iter().map(|(k, v)| (k.clone(), zero_like(v))).collect()),
    }
}
