/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Ark Sovereign Compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use wasm_encoder::ValType;

/// Size of one memory cell. Struct fields and array elements all use it.
pub const CELL_SIZE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum Primitive {
    I32,
    F64,
    String,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum DataType {
    Primitive(Primitive),
    Struct(String, Vec<(String, DataType)>), // Named struct with ordered fields
    Array(Box<DataType>),                    // [T]
    Tuple(Vec<DataType>),                    // (T, U, ...)
}

impl DataType {
    pub const I32: DataType = DataType::Primitive(Primitive::I32);
    pub const F64: DataType = DataType::Primitive(Primitive::F64);
    pub const STRING: DataType = DataType::Primitive(Primitive::String);
    pub const NONE: DataType = DataType::Primitive(Primitive::None);

    pub fn is_none(&self) -> bool {
        matches!(self, DataType::Primitive(Primitive::None))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Primitive(Primitive::I32) | DataType::Primitive(Primitive::F64)
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Primitive(Primitive::F64))
    }

    /// Machine value types for this type, flattened. `none` produces no
    /// value and a tuple produces one value per element.
    pub fn machine_types(&self) -> Vec<ValType> {
        match self {
            DataType::Primitive(Primitive::I32) => vec![ValType::I32],
            DataType::Primitive(Primitive::F64) => vec![ValType::F32],
            DataType::Primitive(Primitive::String) => vec![ValType::I32],
            DataType::Primitive(Primitive::None) => vec![],
            DataType::Struct(..) | DataType::Array(_) => vec![ValType::I32],
            DataType::Tuple(elements) => elements.iter().flat_map(|e| e.machine_types()).collect(),
        }
    }

    /// Number of local slots a variable of this type occupies.
    pub fn width(&self) -> u32 {
        self.machine_types().len() as u32
    }

    /// Whether a value of this type fits a single memory cell.
    pub fn fits_cell(&self) -> bool {
        self.width() == 1
    }

    /// Byte size of a struct instance laid out with one cell per field.
    pub fn struct_size(fields: &[(String, DataType)]) -> u32 {
        fields.len() as u32 * CELL_SIZE
    }

    /// Position and type of `field` in a struct type.
    pub fn field(&self, field: &str) -> Option<(usize, &DataType)> {
        match self {
            DataType::Struct(_, fields) => fields
                .iter()
                .enumerate()
                .find(|(_, (name, _))| name == field)
                .map(|(i, (_, ty))| (i, ty)),
            _ => None,
        }
    }

    /// Result type of arithmetic on two operands, with i32 → f64 promotion.
    pub fn arithmetic_result(left: &DataType, right: &DataType) -> Option<DataType> {
        if !left.is_numeric() || !right.is_numeric() {
            return None;
        }
        if left.is_float() || right.is_float() {
            Some(DataType::F64)
        } else {
            Some(DataType::I32)
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::I32 => write!(f, "i32"),
            Primitive::F64 => write!(f, "f64"),
            Primitive::String => write!(f, "string"),
            Primitive::None => write!(f, "none"),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Primitive(p) => write!(f, "{}", p),
            DataType::Struct(name, _) => write!(f, "{}", name),
            DataType::Array(inner) => write!(f, "[{}]", inner),
            DataType::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> DataType {
        DataType::Struct(
            "P".to_string(),
            vec![
                ("x".to_string(), DataType::I32),
                ("y".to_string(), DataType::I32),
            ],
        )
    }

    #[test]
    fn test_type_display_format() {
        assert_eq!(format!("{}", DataType::I32), "i32");
        assert_eq!(format!("{}", DataType::STRING), "string");
        assert_eq!(
            format!("{}", DataType::Array(Box::new(DataType::F64))),
            "[f64]"
        );
        assert_eq!(
            format!("{}", DataType::Tuple(vec![DataType::I32, point()])),
            "(i32, P)"
        );
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(point(), point());

        let renamed = DataType::Struct(
            "Q".to_string(),
            vec![
                ("x".to_string(), DataType::I32),
                ("y".to_string(), DataType::I32),
            ],
        );
        assert_ne!(point(), renamed);

        let reordered = DataType::Struct(
            "P".to_string(),
            vec![
                ("y".to_string(), DataType::I32),
                ("x".to_string(), DataType::I32),
            ],
        );
        assert_ne!(point(), reordered);

        assert_eq!(
            DataType::Array(Box::new(DataType::Tuple(vec![DataType::I32]))),
            DataType::Array(Box::new(DataType::Tuple(vec![DataType::I32])))
        );
    }

    #[test]
    fn test_machine_types() {
        assert_eq!(DataType::I32.machine_types(), vec![ValType::I32]);
        assert_eq!(DataType::F64.machine_types(), vec![ValType::F32]);
        assert_eq!(DataType::STRING.machine_types(), vec![ValType::I32]);
        assert!(DataType::NONE.machine_types().is_empty());
        assert_eq!(point().machine_types(), vec![ValType::I32]);

        let nested = DataType::Tuple(vec![
            DataType::F64,
            DataType::Tuple(vec![DataType::I32, DataType::STRING]),
        ]);
        assert_eq!(
            nested.machine_types(),
            vec![ValType::F32, ValType::I32, ValType::I32]
        );
        assert_eq!(nested.width(), 3);
    }

    #[test]
    fn test_field_lookup() {
        assert_eq!(point().field("y"), Some((1, &DataType::I32)));
        assert_eq!(point().field("z"), None);
        assert_eq!(DataType::I32.field("x"), None);
    }

    #[test]
    fn test_arithmetic_promotion() {
        assert_eq!(
            DataType::arithmetic_result(&DataType::I32, &DataType::I32),
            Some(DataType::I32)
        );
        assert_eq!(
            DataType::arithmetic_result(&DataType::I32, &DataType::F64),
            Some(DataType::F64)
        );
        assert_eq!(
            DataType::arithmetic_result(&DataType::STRING, &DataType::I32),
            None
        );
    }
}
