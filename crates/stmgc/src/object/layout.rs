//! Type layout oracle
//!
//! The heap never interprets payload bytes on its own. Sizes, pointer
//! fields and the optional weak field of every type come from a
//! [`TypeLayout`] supplied by the runtime. [`TypeRegistry`] is the
//! table-driven implementation used by tests and simple embedders.

use super::address::{round_up_for_allocation, WORD};
use super::header::{TypeId, HEADER_SIZE};
use super::refmap::ReferenceMap;
use crate::ensure;
use crate::error::{Result, StmError};

/// Per-type layout queries
pub trait TypeLayout: Send + Sync {
    /// Payload size in bytes, excluding the header; `None` for unknown types
    fn payload_size(&self, type_id: TypeId) -> Option<usize>;

    /// Visit the payload offset of every strong pointer field
    ///
    /// The weak field, if any, is not visited.
    fn trace(&self, type_id: TypeId, visit: &mut dyn FnMut(usize));

    /// Payload offset of the weak-reference field, if the type has one
    fn weak_field_offset(&self, type_id: TypeId) -> Option<usize>;

    /// Total object size: header plus payload, rounded up to a word
    fn object_size(&self, type_id: TypeId) -> Result<usize> {
        self.payload_size(type_id)
            .map(|payload| round_up_for_allocation(HEADER_SIZE + payload))
            .ok_or(StmError::UnknownType(type_id))
    }
}

/// Layout description of one type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub payload_size: usize,
    pub refs: ReferenceMap,
    pub weak_offset: Option<usize>,
}

impl TypeDescriptor {
    /// A type of `payload_size` bytes with no pointer fields
    pub fn new(name: impl Into<String>, payload_size: usize) -> Self {
        Self {
            name: name.into(),
            payload_size,
            refs: ReferenceMap::empty(),
            weak_offset: None,
        }
    }

    pub fn with_refs(mut self, refs: ReferenceMap) -> Self {
        self.refs = refs;
        self
    }

    pub fn with_weak_field(mut self, offset: usize) -> Self {
        self.weak_offset = Some(offset);
        self
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.refs.extent() <= self.payload_size,
            StmError::Configuration(format!(
                "type {}: pointer fields extend past payload of {} bytes",
                self.name, self.payload_size
            ))
        );

        if let Some(weak) = self.weak_offset {
            ensure!(
                weak % WORD == 0
                    && weak
                        .checked_add(WORD)
                        .is_some_and(|end| end <= self.payload_size),
                StmError::Configuration(format!(
                    "type {}: weak field at {} is not a word inside the payload",
                    self.name, weak
                ))
            );
            ensure!(
                !self.refs.is_reference(weak),
                StmError::Configuration(format!(
                    "type {}: weak field at {} is also a strong pointer",
                    self.name, weak
                ))
            );
        }

        Ok(())
    }
}

/// Table of registered types, indexed by `TypeId`
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<TypeDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type and return its id
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<TypeId> {
        descriptor.validate()?;
        let id = u32::try_from(self.types.len())
            .map_err(|_| StmError::Configuration("type table is full".to_string()))?;
        self.types.push(descriptor);
        Ok(TypeId(id))
    }

    pub fn get(&self, type_id: TypeId) -> Option<&TypeDescriptor> {
        self.types.get(type_id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeLayout for TypeRegistry {
    fn payload_size(&self, type_id: TypeId) -> Option<usize> {
        self.get(type_id).map(|d| d.payload_size)
    }

    fn trace(&self, type_id: TypeId, visit: &mut dyn FnMut(usize)) {
        if let Some(descriptor) = self.get(type_id) {
            descriptor.refs.iter().for_each(visit);
        }
    }

    fn weak_field_offset(&self, type_id: TypeId) -> Option<usize> {
        self.get(type_id).and_then(|d| d.weak_offset)
    }
}
