//! Codec construction: a closed match over the finite set of Candid type
//! kinds. Recursive bindings are interned by name and filled in two phases
//! (reserve slot, build definition, fill) so cycles terminate.

use super::{Codec, CodecError, CodecTable, VariantArm, scalar};
use candid::TypeEnv;
use candid::types::{Field, Label, Type, TypeInner};
use std::collections::HashMap;

/// Build a codec for `ty`, allocating recursive bindings in `table`.
///
/// One [`Builder`] should be reused across related types (all methods of an
/// interface) so identical recursive bindings share a slot.
pub fn build(env: &TypeEnv, table: &mut CodecTable, ty: &Type) -> Result<Codec, CodecError> {
    Builder::new(env, table).build(ty)
}

///
/// Builder
///

pub(crate) struct Builder<'a> {
    env: &'a TypeEnv,
    table: &'a mut CodecTable,
    bindings: HashMap<String, usize>,
}

impl<'a> Builder<'a> {
    pub fn new(env: &'a TypeEnv, table: &'a mut CodecTable) -> Self {
        Self {
            env,
            table,
            bindings: HashMap::new(),
        }
    }

    pub fn build(&mut self, ty: &Type) -> Result<Codec, CodecError> {
        let codec = match ty.as_ref() {
            TypeInner::Bool => Codec::Bool,
            TypeInner::Text => Codec::Text,
            TypeInner::Float32 | TypeInner::Float64 => Codec::Float,
            TypeInner::Null | TypeInner::Reserved => Codec::Null,
            TypeInner::Nat | TypeInner::Int | TypeInner::Nat64 | TypeInner::Int64 => Codec::BigInt,
            TypeInner::Nat8
            | TypeInner::Nat16
            | TypeInner::Nat32
            | TypeInner::Int8
            | TypeInner::Int16
            | TypeInner::Int32 => Codec::SmallInt,
            TypeInner::Principal => Codec::Principal,
            TypeInner::Opt(inner) => Codec::Opt(Box::new(self.build(inner)?)),
            TypeInner::Vec(elem) => self.build_vec(elem)?,
            TypeInner::Record(fields) => self.build_record(fields)?,
            TypeInner::Variant(arms) => self.build_variant(arms)?,
            TypeInner::Func(_) => Codec::Func,
            TypeInner::Service(_) => Codec::Service,
            TypeInner::Var(name) => self.build_binding(name)?,
            // Init-argument wrappers carry the inner type.
            TypeInner::Class(_, inner) => self.build(inner)?,
            other => return Err(CodecError::Unsupported(format!("{other:?}"))),
        };

        Ok(codec)
    }

    fn build_vec(&mut self, elem: &Type) -> Result<Codec, CodecError> {
        let resolved = self.resolve(elem)?;

        if matches!(resolved.as_ref(), TypeInner::Nat8) {
            return Ok(Codec::Blob);
        }
        if let Some(value_ty) = self.assoc_value_type(&resolved)? {
            return Ok(Codec::AssocList(Box::new(self.build(&value_ty)?)));
        }

        Ok(Codec::Vec(Box::new(self.build(elem)?)))
    }

    /// The value type of an association-list element: a two-field tuple
    /// whose first component resolves to `text`.
    fn assoc_value_type(&self, elem: &Type) -> Result<Option<Type>, CodecError> {
        let TypeInner::Record(fields) = elem.as_ref() else {
            return Ok(None);
        };
        if fields.len() != 2 || !is_tuple(fields) {
            return Ok(None);
        }

        let key = self.resolve(&fields[0].ty)?;
        if matches!(key.as_ref(), TypeInner::Text) {
            Ok(Some(fields[1].ty.clone()))
        } else {
            Ok(None)
        }
    }

    fn build_record(&mut self, fields: &[Field]) -> Result<Codec, CodecError> {
        if is_tuple(fields) {
            let elems = fields
                .iter()
                .map(|field| self.build(&field.ty))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Codec::Tuple(elems));
        }

        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            out.push((scalar::label_key(&field.id), self.build(&field.ty)?));
        }

        Ok(Codec::Record(out))
    }

    fn build_variant(&mut self, arms: &[Field]) -> Result<Codec, CodecError> {
        let mut out = Vec::with_capacity(arms.len());
        for arm in arms {
            let payload = if self.is_null(&arm.ty)? {
                None
            } else {
                Some(self.build(&arm.ty)?)
            };
            out.push(VariantArm {
                name: scalar::label_key(&arm.id),
                payload,
            });
        }

        Ok(Codec::Variant(out))
    }

    fn build_binding(&mut self, name: &str) -> Result<Codec, CodecError> {
        if let Some(&slot) = self.bindings.get(name) {
            return Ok(Codec::Rec(slot));
        }

        let slot = self.table.reserve();
        self.bindings.insert(name.to_string(), slot);
        let definition = self.find(name)?;
        let codec = self.build(&definition)?;
        self.table.fill(slot, codec);

        Ok(Codec::Rec(slot))
    }

    fn is_null(&self, ty: &Type) -> Result<bool, CodecError> {
        Ok(matches!(self.resolve(ty)?.as_ref(), TypeInner::Null))
    }

    /// Follow `var` indirections to the underlying definition. Unproductive
    /// cycles are rejected when the interface is checked, so this terminates.
    fn resolve(&self, ty: &Type) -> Result<Type, CodecError> {
        let mut current = ty.clone();
        loop {
            let next = match current.as_ref() {
                TypeInner::Var(name) => self.find(name)?,
                _ => return Ok(current),
            };
            current = next;
        }
    }

    fn find(&self, name: &str) -> Result<Type, CodecError> {
        self.env
            .find_type(name)
            .cloned()
            .map_err(|err| CodecError::Unsupported(format!("unbound type {name:?}: {err}")))
    }
}

fn is_tuple(fields: &[Field]) -> bool {
    !fields.is_empty()
        && fields
            .iter()
            .enumerate()
            .all(|(index, field)| label_index(&field.id) == Some(index))
}

const fn label_index(label: &Label) -> Option<usize> {
    match label {
        Label::Id(id) | Label::Unnamed(id) => Some(*id as usize),
        Label::Named(_) => None,
    }
}

///
/// TESTS
///
