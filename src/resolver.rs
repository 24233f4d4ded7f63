use std::collections::BTreeSet;
use std::str::FromStr;

use anyhow::{Context, Result};
use jdescriptor::{MethodDescriptor, TypeDescriptor};

use crate::ir::{CallKind, CallSite, FieldRef, InstructionKind, MethodRef};
use crate::metadata::MetadataSource;
use crate::signature::extract_class_types;

const APPEND_OWNER: &str = "java/lang/StringBuilder";
const APPEND_NAME: &str = "append";
const APPEND_DESCRIPTOR: &str = "(Ljava/lang/Object;)Ljava/lang/StringBuilder;";
const TO_STRING_NAME: &str = "toString";
const TO_STRING_DESCRIPTOR: &str = "()Ljava/lang/String;";

/// Collects the methods visited by one target method, walking its bytecode
/// in a single linear pass.
///
/// Besides explicit invocation instructions, the finder models one
/// desugaring: `stringBuilder.append(obj)` through the generic `Object`
/// overload is treated as also invoking `obj.toString()`. The type of the
/// appended value is recovered from a best-effort tracker of the most
/// recently pushed stack value, which only reacts to field reads and method
/// invocations; any other instruction in between leaves the tracked type
/// stale. That imprecision is accepted, not compensated for.
pub(crate) struct VisitedMethodFinder<'a, S: MetadataSource> {
    source: &'a S,
    target_name: String,
    target_descriptor: String,
    visited: BTreeSet<MethodRef>,
    last_pushed_type: Option<String>,
    last_pushed_signature: Option<String>,
}

impl<'a, S: MetadataSource> VisitedMethodFinder<'a, S> {
    pub(crate) fn new(source: &'a S, method_name: &str, descriptor: &str) -> Result<Self> {
        anyhow::ensure!(!method_name.is_empty(), "target method name is empty");
        anyhow::ensure!(!descriptor.is_empty(), "target method descriptor is empty");
        Ok(Self {
            source,
            target_name: method_name.to_string(),
            target_descriptor: descriptor.to_string(),
            visited: BTreeSet::new(),
            last_pushed_type: None,
            last_pushed_signature: None,
        })
    }

    /// Resolve the visited-method set of the target method declared on
    /// `class_name`. A class that declares no matching method yields an
    /// empty set; only the matching method's body is ever decoded.
    pub(crate) fn resolve(mut self, class_name: &str) -> Result<BTreeSet<MethodRef>> {
        let metadata = self.source.read_class(class_name)?;
        let declared = metadata
            .methods
            .iter()
            .any(|method| method.name == self.target_name && method.descriptor == self.target_descriptor);
        if !declared {
            return Ok(self.visited);
        }

        let instructions =
            self.source
                .method_instructions(class_name, &self.target_name, &self.target_descriptor)?;
        for instruction in &instructions {
            match &instruction.kind {
                InstructionKind::FieldRead(field) => self
                    .visit_field_read(field)
                    .with_context(|| format!("at bytecode offset {}", instruction.offset))?,
                InstructionKind::Invoke(call) => self
                    .visit_invoke(call)
                    .with_context(|| format!("at bytecode offset {}", instruction.offset))?,
                InstructionKind::FieldWrite(_) | InstructionKind::Other(_) => {}
            }
        }
        Ok(self.visited)
    }

    fn visit_field_read(&mut self, field: &FieldRef) -> Result<()> {
        self.last_pushed_type = field_class_type(&field.descriptor);
        self.last_pushed_signature =
            self.find_field_signature(&field.owner, &field.name, &field.descriptor)?;
        Ok(())
    }

    fn visit_invoke(&mut self, call: &CallSite) -> Result<()> {
        if call.owner == APPEND_OWNER
            && call.name == APPEND_NAME
            && call.descriptor == APPEND_DESCRIPTOR
        {
            // stringBuilder.append(obj) implies obj.toString().
            self.record_implicit_to_string()?;
        }

        self.visited.insert(MethodRef {
            owner: call.owner.clone(),
            name: call.name.clone(),
            descriptor: call.descriptor.clone(),
            is_static: call.kind == CallKind::Static,
        });

        self.last_pushed_type = return_class_type(&call.descriptor)?;
        self.last_pushed_signature =
            self.find_method_signature(&call.owner, &call.name, &call.descriptor)?;
        Ok(())
    }

    /// Resolve the `toString()` implied by an append-object call site, using
    /// the stack-top type tracked before the call.
    fn record_implicit_to_string(&mut self) -> Result<()> {
        let Some(type_name) = self.last_pushed_type.clone() else {
            return Ok(());
        };
        if let Some(found) =
            find_method_from(self.source, &type_name, TO_STRING_NAME, TO_STRING_DESCRIPTOR, false)?
        {
            self.visited.insert(found);
            return Ok(());
        }

        // The appended value is statically an interface like Collection<T>
        // or Map<K, V>. Guess that the generic type arguments name the
        // runtime classes whose toString() will actually run.
        let Some(signature) = self.last_pushed_signature.clone() else {
            return Ok(());
        };
        for class_name in extract_class_types(&signature) {
            if let Some(found) = find_method_from(
                self.source,
                &class_name,
                TO_STRING_NAME,
                TO_STRING_DESCRIPTOR,
                false,
            )? {
                self.visited.insert(found);
            }
        }
        Ok(())
    }

    fn find_field_signature(
        &self,
        owner: &str,
        field_name: &str,
        descriptor: &str,
    ) -> Result<Option<String>> {
        let metadata = self.source.read_class(owner)?;
        Ok(metadata
            .fields
            .iter()
            .find(|field| field.name == field_name && field.descriptor == descriptor)
            .and_then(|field| field.signature.clone()))
    }

    fn find_method_signature(
        &self,
        owner: &str,
        method_name: &str,
        descriptor: &str,
    ) -> Result<Option<String>> {
        let metadata = self.source.read_class(owner)?;
        Ok(metadata
            .methods
            .iter()
            .find(|method| method.name == method_name && method.descriptor == descriptor)
            .and_then(|method| method.signature.clone()))
    }
}

/// Walk the superclass chain from `class_name` looking for an exact
/// (name, descriptor) match, returning a reference naming the declaring
/// class. Interfaces are never walked upward, so default interface methods
/// are not resolved. An exhausted chain is an expected miss, not an error.
pub(crate) fn find_method_from(
    source: &impl MetadataSource,
    class_name: &str,
    method_name: &str,
    descriptor: &str,
    is_static: bool,
) -> Result<Option<MethodRef>> {
    let mut current = Some(class_name.to_string());
    while let Some(current_name) = current {
        let metadata = source.read_class(&current_name)?;
        let declared = metadata
            .methods
            .iter()
            .any(|method| method.name == method_name && method.descriptor == descriptor);
        if declared {
            return Ok(Some(MethodRef {
                owner: current_name,
                name: method_name.to_string(),
                descriptor: descriptor.to_string(),
                is_static,
            }));
        }
        if metadata.is_interface {
            return Ok(None);
        }
        current = metadata.super_name;
    }
    Ok(None)
}

/// Class type named by a field descriptor. Primitive and array types carry
/// no class to resolve `toString()` on, so they clear the tracked type.
fn field_class_type(descriptor: &str) -> Option<String> {
    TypeDescriptor::from_str(descriptor)
        .ok()
        .as_ref()
        .and_then(object_type_name)
}

/// Class type named by a method descriptor's return type.
fn return_class_type(descriptor: &str) -> Result<Option<String>> {
    let descriptor =
        MethodDescriptor::from_str(descriptor).context("parse method descriptor")?;
    Ok(object_type_name(descriptor.return_type()))
}

fn object_type_name(descriptor: &TypeDescriptor) -> Option<String> {
    match descriptor {
        TypeDescriptor::Object(name) => Some(name.clone()),
        _ => None,
    }
}
