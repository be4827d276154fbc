// src/rules.rs
// ============================================================================
// RULES - Reglas de conversión de dtype "from:to"
// ============================================================================
//
// parse_rules:  ["float32:float16", "int32:int16"] → {Float32→Float16, Int32→Int16}
// apply_rules:  recodifica solo los tensores cuyo dtype tiene regla;
//               el resto pasa tal cual (comparten payload con el origen).
//
// Regla duplicada para el mismo origen: gana la última (con warning).
//
// ============================================================================

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::error::{ConvertError, Result, RuleSide};
use crate::tensor::{Dtype, TensorSet};

/// Mapa dtype origen → dtype destino
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionRuleSet {
    rules: HashMap<Dtype, Dtype>,
}

impl ConversionRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Añade una regla, devuelve el destino anterior si existía
    pub fn insert(&mut self, from: Dtype, to: Dtype) -> Option<Dtype> {
        self.rules.insert(from, to)
    }

    pub fn target_for(&self, from: Dtype) -> Option<Dtype> {
        self.rules.get(&from).copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn parse_side(token: &str, side: RuleSide) -> Result<Dtype> {
    Dtype::from_label(token).ok_or_else(|| ConvertError::UnknownDtype {
        token: token.to_string(),
        side,
    })
}

/// Parsea una regla individual "from:to"
pub fn parse_rule(option: &str) -> Result<(Dtype, Dtype)> {
    let mut parts = option.split(':');
    let (from, to) = match (parts.next(), parts.next(), parts.next()) {
        (Some(from), Some(to), None) => (from, to),
        _ => {
            return Err(ConvertError::InvalidRuleFormat { rule: option.to_string() });
        }
    };

    Ok((parse_side(from, RuleSide::Source)?, parse_side(to, RuleSide::Target)?))
}

/// Parsea todas las reglas. Falla en la primera inválida.
pub fn parse_rules<S: AsRef<str>>(options: &[S]) -> Result<ConversionRuleSet> {
    let mut rules = ConversionRuleSet::new();

    for option in options {
        let (from, to) = parse_rule(option.as_ref())?;
        if let Some(previous) = rules.insert(from, to) {
            if previous != to {
                warn!("Rule {}:{} overrides earlier rule {}:{}", from, to, from, previous);
            }
        }
    }

    Ok(rules)
}

/// Aplica las reglas a todo el conjunto. Mismo orden y nombres que la entrada.
pub fn apply_rules(tensors: &TensorSet, rules: &ConversionRuleSet) -> TensorSet {
    apply_rules_with(tensors, rules, |_| {})
}

/// Igual que `apply_rules`, llamando `on_tensor` tras procesar cada entrada
/// (para barras de progreso).
pub fn apply_rules_with<F>(tensors: &TensorSet, rules: &ConversionRuleSet, mut on_tensor: F) -> TensorSet
where
    F: FnMut(&str),
{
    let mut converted = TensorSet::new();
    let mut converted_count = 0usize;

    for (name, tensor) in tensors.iter() {
        let out = match rules.target_for(tensor.dtype()) {
            Some(target) if target != tensor.dtype() => {
                debug!("{}: {} -> {}", name, tensor.dtype(), target);
                converted_count += 1;
                tensor.cast(target)
            }
            _ => tensor.clone(),
        };
        converted.insert(name, out);
        on_tensor(name);
    }

    if !rules.is_empty() {
        info!(
            "Converted {} tensors, {} passed through unchanged",
            converted_count,
            tensors.len() - converted_count
        );
    }

    converted
}
