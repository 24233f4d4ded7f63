//! Test-only builder for minimal, deterministic class file bytes.
//!
//! Keeps the test suite hermetic: fixtures are assembled in-process instead
//! of being extracted from downloaded JARs. The emitted bytes are structurally
//! valid (constant pool, field/method tables, Code and Signature attributes)
//! but are not required to pass bytecode verification.

const MAGIC: u32 = 0xCAFE_BABE;
const MAJOR_VERSION: u16 = 52;

pub(crate) struct ClassBytes {
    name: String,
    super_name: Option<String>,
    is_interface: bool,
    fields: Vec<TestField>,
    methods: Vec<TestMethod>,
}

struct TestField {
    name: String,
    descriptor: String,
    signature: Option<String>,
}

struct TestMethod {
    name: String,
    descriptor: String,
    signature: Option<String>,
    code: Option<Vec<TestInsn>>,
}

/// Instructions the builder knows how to encode.
pub(crate) enum TestInsn {
    Nop,
    Aload0,
    Return,
    GetField {
        owner: String,
        name: String,
        descriptor: String,
    },
    InvokeVirtual {
        owner: String,
        name: String,
        descriptor: String,
    },
    /// Padded tableswitch with all branch offsets zeroed. The pad depends on
    /// the opcode's position in the stream, so it is computed at emit time.
    TableSwitch {
        low: i32,
        high: i32,
    },
    /// Padded lookupswitch with zeroed match/offset pairs.
    LookupSwitch {
        pairs: u16,
    },
    /// wide-prefixed iinc, the six-byte form of the prefix.
    WideIinc,
}

impl ClassBytes {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            is_interface: false,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub(crate) fn interface(name: &str) -> Self {
        Self {
            is_interface: true,
            ..Self::new(name)
        }
    }

    pub(crate) fn super_class(mut self, name: &str) -> Self {
        self.super_name = Some(name.to_string());
        self
    }

    pub(crate) fn field(mut self, name: &str, descriptor: &str, signature: Option<&str>) -> Self {
        self.fields.push(TestField {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: signature.map(str::to_string),
        });
        self
    }

    pub(crate) fn method(
        mut self,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        code: Vec<TestInsn>,
    ) -> Self {
        self.methods.push(TestMethod {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: signature.map(str::to_string),
            code: Some(code),
        });
        self
    }

    pub(crate) fn abstract_method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(TestMethod {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
            code: None,
        });
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut pool = Pool::default();
        let this_index = pool.class(&self.name);
        let super_index = match &self.super_name {
            Some(name) => pool.class(name),
            None => 0,
        };

        let field_blobs: Vec<Vec<u8>> = self
            .fields
            .iter()
            .map(|field| emit_field(&mut pool, field))
            .collect();
        let method_blobs: Vec<Vec<u8>> = self
            .methods
            .iter()
            .map(|method| emit_method(&mut pool, method))
            .collect();

        let access_flags: u16 = if self.is_interface {
            // ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT
            0x0601
        } else {
            // ACC_PUBLIC | ACC_SUPER
            0x0021
        };

        let mut out = Vec::new();
        push_u32(&mut out, MAGIC);
        push_u16(&mut out, 0);
        push_u16(&mut out, MAJOR_VERSION);
        pool.emit(&mut out);
        push_u16(&mut out, access_flags);
        push_u16(&mut out, this_index);
        push_u16(&mut out, super_index);
        push_u16(&mut out, 0); // interfaces
        push_u16(&mut out, field_blobs.len() as u16);
        for blob in field_blobs {
            out.extend_from_slice(&blob);
        }
        push_u16(&mut out, method_blobs.len() as u16);
        for blob in method_blobs {
            out.extend_from_slice(&blob);
        }
        push_u16(&mut out, 0); // class attributes
        out
    }
}

fn emit_field(pool: &mut Pool, field: &TestField) -> Vec<u8> {
    let name_index = pool.utf8(&field.name);
    let descriptor_index = pool.utf8(&field.descriptor);
    let signature = field
        .signature
        .as_deref()
        .map(|signature| emit_signature_attribute(pool, signature));

    let mut out = Vec::new();
    push_u16(&mut out, 0x0002); // ACC_PRIVATE
    push_u16(&mut out, name_index);
    push_u16(&mut out, descriptor_index);
    match signature {
        Some(attribute) => {
            push_u16(&mut out, 1);
            out.extend_from_slice(&attribute);
        }
        None => push_u16(&mut out, 0),
    }
    out
}

fn emit_method(pool: &mut Pool, method: &TestMethod) -> Vec<u8> {
    let name_index = pool.utf8(&method.name);
    let descriptor_index = pool.utf8(&method.descriptor);
    let signature = method
        .signature
        .as_deref()
        .map(|signature| emit_signature_attribute(pool, signature));
    let code = method
        .code
        .as_deref()
        .map(|code| emit_code_attribute(pool, code));

    let access_flags: u16 = if method.code.is_none() {
        // ACC_PUBLIC | ACC_ABSTRACT
        0x0401
    } else {
        0x0001
    };

    let mut out = Vec::new();
    push_u16(&mut out, access_flags);
    push_u16(&mut out, name_index);
    push_u16(&mut out, descriptor_index);
    let attributes: Vec<Vec<u8>> = [code, signature].into_iter().flatten().collect();
    push_u16(&mut out, attributes.len() as u16);
    for attribute in attributes {
        out.extend_from_slice(&attribute);
    }
    out
}

fn emit_signature_attribute(pool: &mut Pool, signature: &str) -> Vec<u8> {
    let attribute_name = pool.utf8("Signature");
    let signature_index = pool.utf8(signature);

    let mut out = Vec::new();
    push_u16(&mut out, attribute_name);
    push_u32(&mut out, 2);
    push_u16(&mut out, signature_index);
    out
}

fn emit_code_attribute(pool: &mut Pool, instructions: &[TestInsn]) -> Vec<u8> {
    let attribute_name = pool.utf8("Code");
    let mut code = Vec::new();
    for instruction in instructions {
        match instruction {
            TestInsn::Nop => code.push(0x00),
            TestInsn::Aload0 => code.push(0x2a),
            TestInsn::Return => code.push(0xb1),
            TestInsn::GetField {
                owner,
                name,
                descriptor,
            } => {
                let index = pool.field_ref(owner, name, descriptor);
                code.push(0xb4);
                push_u16(&mut code, index);
            }
            TestInsn::InvokeVirtual {
                owner,
                name,
                descriptor,
            } => {
                let index = pool.method_ref(owner, name, descriptor);
                code.push(0xb6);
                push_u16(&mut code, index);
            }
            TestInsn::TableSwitch { low, high } => {
                code.push(0xaa);
                push_switch_padding(&mut code);
                push_u32(&mut code, 0); // default
                push_u32(&mut code, *low as u32);
                push_u32(&mut code, *high as u32);
                for _ in *low..=*high {
                    push_u32(&mut code, 0);
                }
            }
            TestInsn::LookupSwitch { pairs } => {
                code.push(0xab);
                push_switch_padding(&mut code);
                push_u32(&mut code, 0); // default
                push_u32(&mut code, u32::from(*pairs));
                for _ in 0..*pairs {
                    push_u32(&mut code, 0); // match
                    push_u32(&mut code, 0); // offset
                }
            }
            TestInsn::WideIinc => {
                code.push(0xc4);
                code.push(0x84);
                push_u16(&mut code, 0); // local index
                push_u16(&mut code, 1); // increment
            }
        }
    }

    let mut out = Vec::new();
    push_u16(&mut out, attribute_name);
    push_u32(&mut out, 12 + code.len() as u32);
    push_u16(&mut out, 8); // max_stack
    push_u16(&mut out, 8); // max_locals
    push_u32(&mut out, code.len() as u32);
    out.extend_from_slice(&code);
    push_u16(&mut out, 0); // exception table
    push_u16(&mut out, 0); // code attributes
    out
}

#[derive(PartialEq)]
enum PoolEntry {
    Utf8(String),
    Class(u16),
    NameAndType(u16, u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
}

#[derive(Default)]
struct Pool {
    entries: Vec<PoolEntry>,
}

impl Pool {
    fn intern(&mut self, entry: PoolEntry) -> u16 {
        if let Some(position) = self.entries.iter().position(|existing| *existing == entry) {
            return (position + 1) as u16;
        }
        self.entries.push(entry);
        self.entries.len() as u16
    }

    fn utf8(&mut self, value: &str) -> u16 {
        self.intern(PoolEntry::Utf8(value.to_string()))
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.intern(PoolEntry::Class(name_index))
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.intern(PoolEntry::NameAndType(name_index, descriptor_index))
    }

    fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(PoolEntry::FieldRef(class_index, name_and_type_index))
    }

    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(PoolEntry::MethodRef(class_index, name_and_type_index))
    }

    fn emit(&self, out: &mut Vec<u8>) {
        push_u16(out, (self.entries.len() + 1) as u16);
        for entry in &self.entries {
            match entry {
                PoolEntry::Utf8(value) => {
                    out.push(1);
                    push_u16(out, value.len() as u16);
                    out.extend_from_slice(value.as_bytes());
                }
                PoolEntry::Class(name_index) => {
                    out.push(7);
                    push_u16(out, *name_index);
                }
                PoolEntry::NameAndType(name_index, descriptor_index) => {
                    out.push(12);
                    push_u16(out, *name_index);
                    push_u16(out, *descriptor_index);
                }
                PoolEntry::FieldRef(class_index, name_and_type_index) => {
                    out.push(9);
                    push_u16(out, *class_index);
                    push_u16(out, *name_and_type_index);
                }
                PoolEntry::MethodRef(class_index, name_and_type_index) => {
                    out.push(10);
                    push_u16(out, *class_index);
                    push_u16(out, *name_and_type_index);
                }
            }
        }
    }
}

// Switch operands start at the next 4-byte boundary relative to the start
// of the code array.
fn push_switch_padding(code: &mut Vec<u8>) {
    while code.len() % 4 != 0 {
        code.push(0);
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}
