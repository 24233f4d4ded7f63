use std::collections::HashMap;

use anyhow::{Context, Result};
use jclassfile::attributes::Attribute;
use jclassfile::class_file::{self, ClassFlags};
use jclassfile::constant_pool::ConstantPool;

use crate::ir::{
    CallKind, CallSite, ClassMetadata, FieldMetadata, FieldRef, Instruction, InstructionKind,
    MethodMetadata,
};
use crate::opcodes;

/// Oracle for structural facts about classes. Implementations never mutate
/// class data; the resolver only reads through this interface.
///
/// A class that cannot be located or decoded is a fatal error. Lookup misses
/// inside a successfully decoded class (a field or method that is simply not
/// declared there) are expected and surface as absent values, not errors.
pub(crate) trait MetadataSource {
    fn read_class(&self, name: &str) -> Result<ClassMetadata>;

    /// Decoded instruction stream for exactly one method body. Bodies are
    /// decoded on demand so non-target methods stay unparsed.
    fn method_instructions(
        &self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
    ) -> Result<Vec<Instruction>>;
}

/// One scanned class: declared structure plus the raw material needed to
/// decode individual method bodies later.
pub(crate) struct ClassRecord {
    metadata: ClassMetadata,
    constant_pool: Vec<ConstantPool>,
    bodies: Vec<MethodBody>,
}

struct MethodBody {
    name: String,
    descriptor: String,
    code: Vec<u8>,
}

impl ClassRecord {
    pub(crate) fn class_name(&self) -> &str {
        &self.metadata.name
    }

    fn method_instructions(&self, method_name: &str, descriptor: &str) -> Result<Vec<Instruction>> {
        let body = self
            .bodies
            .iter()
            .find(|body| body.name == method_name && body.descriptor == descriptor);
        match body {
            Some(body) => decode_bytecode(&body.code, &self.constant_pool).with_context(|| {
                format!(
                    "failed to decode bytecode of {}.{}{}",
                    self.metadata.name, method_name, descriptor
                )
            }),
            // Abstract and native methods carry no Code attribute.
            None => Ok(Vec::new()),
        }
    }
}

/// Metadata source backed by the classes scanned from the input and the
/// classpath. The first definition of a duplicated class name wins, matching
/// JVM classpath order.
pub(crate) struct ClasspathMetadataSource {
    classes: HashMap<String, ClassRecord>,
}

impl ClasspathMetadataSource {
    pub(crate) fn new(records: Vec<ClassRecord>) -> Self {
        let mut classes = HashMap::new();
        for record in records {
            classes
                .entry(record.class_name().to_string())
                .or_insert(record);
        }
        Self { classes }
    }

    fn record(&self, name: &str) -> Result<&ClassRecord> {
        self.classes
            .get(name)
            .with_context(|| format!("class not found on classpath: {name}"))
    }
}

impl MetadataSource for ClasspathMetadataSource {
    fn read_class(&self, name: &str) -> Result<ClassMetadata> {
        Ok(self.record(name)?.metadata.clone())
    }

    fn method_instructions(
        &self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
    ) -> Result<Vec<Instruction>> {
        self.record(class_name)?
            .method_instructions(method_name, descriptor)
    }
}

/// Parse class file bytes into a record: declared structure eagerly, method
/// bodies kept as raw code for on-demand decoding.
pub(crate) fn parse_class_record(data: &[u8]) -> Result<ClassRecord> {
    let class_file = class_file::parse(data).context("failed to parse class file bytes")?;
    let constant_pool = class_file.constant_pool().to_vec();

    let name = resolve_class_name(&constant_pool, class_file.this_class())
        .context("resolve class name")?;
    let super_name = if class_file.super_class() == 0 {
        None
    } else {
        Some(
            resolve_class_name(&constant_pool, class_file.super_class())
                .context("resolve super class name")?,
        )
    };
    let is_interface = class_file
        .access_flags()
        .contains(ClassFlags::ACC_INTERFACE);

    let mut fields = Vec::new();
    for field in class_file.fields() {
        let field_name =
            resolve_utf8(&constant_pool, field.name_index()).context("resolve field name")?;
        let descriptor = resolve_utf8(&constant_pool, field.descriptor_index())
            .context("resolve field descriptor")?;
        let signature = attribute_signature(&constant_pool, field.attributes())
            .context("resolve field signature")?;
        fields.push(FieldMetadata {
            name: field_name,
            descriptor,
            signature,
        });
    }

    let mut methods = Vec::new();
    let mut bodies = Vec::new();
    for method in class_file.methods() {
        let method_name =
            resolve_utf8(&constant_pool, method.name_index()).context("resolve method name")?;
        let descriptor = resolve_utf8(&constant_pool, method.descriptor_index())
            .context("resolve method descriptor")?;
        let signature = attribute_signature(&constant_pool, method.attributes())
            .context("resolve method signature")?;
        let code = method.attributes().iter().find_map(|attribute| match attribute {
            Attribute::Code { code, .. } => Some(code.clone()),
            _ => None,
        });
        if let Some(code) = code {
            bodies.push(MethodBody {
                name: method_name.clone(),
                descriptor: descriptor.clone(),
                code,
            });
        }
        methods.push(MethodMetadata {
            name: method_name,
            descriptor,
            signature,
        });
    }

    Ok(ClassRecord {
        metadata: ClassMetadata {
            name,
            super_name,
            is_interface,
            fields,
            methods,
        },
        constant_pool,
        bodies,
    })
}

fn attribute_signature(
    constant_pool: &[ConstantPool],
    attributes: &[Attribute],
) -> Result<Option<String>> {
    for attribute in attributes {
        if let Attribute::Signature { signature_index } = attribute {
            return Ok(Some(resolve_utf8(constant_pool, *signature_index)?));
        }
    }
    Ok(None)
}

fn resolve_class_name(constant_pool: &[ConstantPool], class_index: u16) -> Result<String> {
    let entry = constant_pool
        .get(class_index as usize)
        .context("missing class entry")?;
    match entry {
        ConstantPool::Class { name_index } => resolve_utf8(constant_pool, *name_index),
        _ => anyhow::bail!("unexpected class entry"),
    }
}

fn resolve_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<String> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing utf8 entry")?;
    match entry {
        ConstantPool::Utf8 { value } => Ok(value.clone()),
        _ => anyhow::bail!("unexpected utf8 entry"),
    }
}

fn decode_bytecode(code: &[u8], constant_pool: &[ConstantPool]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let opcode = code[offset];
        let start_offset = offset as u32;
        let length = opcode_length(code, offset)?;
        if length == 0 || offset + length > code.len() {
            anyhow::bail!("invalid bytecode length at offset {}", offset);
        }
        let kind = match opcode {
            opcodes::GETSTATIC | opcodes::GETFIELD => {
                let field_index = read_u16(code, offset + 1)?;
                InstructionKind::FieldRead(
                    resolve_field_ref(constant_pool, field_index).context("resolve field ref")?,
                )
            }
            opcodes::PUTSTATIC | opcodes::PUTFIELD => {
                let field_index = read_u16(code, offset + 1)?;
                InstructionKind::FieldWrite(
                    resolve_field_ref(constant_pool, field_index).context("resolve field ref")?,
                )
            }
            opcodes::INVOKEVIRTUAL
            | opcodes::INVOKESPECIAL
            | opcodes::INVOKESTATIC
            | opcodes::INVOKEINTERFACE => {
                let method_index = read_u16(code, offset + 1)?;
                let method_ref = resolve_method_ref(constant_pool, method_index)
                    .context("resolve method ref")?;
                let call_kind = match opcode {
                    opcodes::INVOKESPECIAL => CallKind::Special,
                    opcodes::INVOKESTATIC => CallKind::Static,
                    opcodes::INVOKEINTERFACE => CallKind::Interface,
                    _ => CallKind::Virtual,
                };
                InstructionKind::Invoke(CallSite {
                    owner: method_ref.owner,
                    name: method_ref.name,
                    descriptor: method_ref.descriptor,
                    kind: call_kind,
                })
            }
            _ => InstructionKind::Other(opcode),
        };

        instructions.push(Instruction {
            offset: start_offset,
            kind,
        });
        offset += length;
    }
    Ok(instructions)
}

struct MemberRef {
    owner: String,
    name: String,
    descriptor: String,
}

fn resolve_field_ref(constant_pool: &[ConstantPool], index: u16) -> Result<FieldRef> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing field ref entry")?;
    let ConstantPool::Fieldref {
        class_index,
        name_and_type_index,
    } = entry
    else {
        anyhow::bail!("unexpected field ref entry");
    };
    let member = resolve_member_ref(constant_pool, *class_index, *name_and_type_index)?;
    Ok(FieldRef {
        owner: member.owner,
        name: member.name,
        descriptor: member.descriptor,
    })
}

fn resolve_method_ref(constant_pool: &[ConstantPool], index: u16) -> Result<MemberRef> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing method ref entry")?;
    let (class_index, name_and_type_index) = match entry {
        ConstantPool::Methodref {
            class_index,
            name_and_type_index,
        } => (*class_index, *name_and_type_index),
        ConstantPool::InterfaceMethodref {
            class_index,
            name_and_type_index,
        } => (*class_index, *name_and_type_index),
        _ => anyhow::bail!("unexpected method ref entry"),
    };
    resolve_member_ref(constant_pool, class_index, name_and_type_index)
}

fn resolve_member_ref(
    constant_pool: &[ConstantPool],
    class_index: u16,
    name_and_type_index: u16,
) -> Result<MemberRef> {
    let owner = resolve_class_name(constant_pool, class_index).context("resolve owner")?;
    let entry = constant_pool
        .get(name_and_type_index as usize)
        .context("missing name and type entry")?;
    let ConstantPool::NameAndType {
        name_index,
        descriptor_index,
    } = entry
    else {
        anyhow::bail!("unexpected name and type entry");
    };
    let name = resolve_utf8(constant_pool, *name_index).context("resolve member name")?;
    let descriptor =
        resolve_utf8(constant_pool, *descriptor_index).context("resolve member descriptor")?;
    Ok(MemberRef {
        owner,
        name,
        descriptor,
    })
}

fn opcode_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code[offset];
    let length = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        opcodes::LDC => 2,
        opcodes::LDC_W | opcodes::LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x5f => 1,
        0x60..=0x83 => 1,
        0x84 => 3,
        0x85..=0x98 => 1,
        0x99..=0xa6 => 3,
        opcodes::GOTO | opcodes::JSR => 3,
        0xa9 => 2,
        opcodes::TABLESWITCH => tableswitch_length(code, offset)?,
        opcodes::LOOKUPSWITCH => lookupswitch_length(code, offset)?,
        0xac..=0xb1 => 1,
        opcodes::GETSTATIC | opcodes::PUTSTATIC | opcodes::GETFIELD | opcodes::PUTFIELD => 3,
        opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKESTATIC => 3,
        opcodes::INVOKEINTERFACE | opcodes::INVOKEDYNAMIC => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        opcodes::WIDE => wide_length(code, offset)?,
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        opcodes::GOTO_W | opcodes::JSR_W => 5,
        0xca => 1,
        0xfe | 0xff => 1,
        _ => anyhow::bail!("unsupported opcode 0x{:02x}", opcode),
    };
    Ok(length)
}

fn tableswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = switch_padding(offset);
    let base = offset + 1 + padding;
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|v| v.checked_add(1))
        .context("invalid tableswitch range")?;
    if count < 0 {
        anyhow::bail!("invalid tableswitch range");
    }
    Ok(1 + padding + 12 + (count as usize) * 4)
}

fn lookupswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = switch_padding(offset);
    let base = offset + 1 + padding;
    let npairs = read_i32(code, base + 4)?;
    if npairs < 0 {
        anyhow::bail!("invalid lookupswitch pairs");
    }
    Ok(1 + padding + 8 + (npairs as usize) * 8)
}

fn wide_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code
        .get(offset + 1)
        .copied()
        .context("missing wide opcode")?;
    if opcode == 0x84 { Ok(6) } else { Ok(4) }
}

fn switch_padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let slice = code
        .get(offset..offset + 2)
        .context("bytecode u16 out of bounds")?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    let slice = code
        .get(offset..offset + 4)
        .context("bytecode i32 out of bounds")?;
    Ok(i32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
