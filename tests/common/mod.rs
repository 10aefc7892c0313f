#![allow(dead_code)]

use std::collections::HashMap;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SYNTHETIC: u16 = 0x1000;

/// Body of a method's Code attribute.
#[derive(Default)]
pub struct MethodCode {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    /// `(start, end, handler, catch type)`; `None` catches everything.
    pub exception_table: Vec<(u16, u16, u16, Option<&'static str>)>,
    /// `(start, length, name, descriptor, slot)`.
    pub local_vars: Vec<(u16, u16, &'static str, &'static str, u16)>,
    /// Written instead of the real `code_length` when set.
    pub declared_length: Option<u32>,
}

impl MethodCode {
    pub fn new(code: Vec<u8>) -> Self {
        Self {
            code,
            max_stack: 8,
            max_locals: 8,
            ..Default::default()
        }
    }

    pub fn catching(mut self, start: u16, end: u16, handler: u16, ty: Option<&'static str>) -> Self {
        self.exception_table.push((start, end, handler, ty));
        self
    }

    pub fn declare_length(mut self, length: u32) -> Self {
        self.declared_length = Some(length);
        self
    }

    pub fn local(mut self, start: u16, length: u16, name: &'static str, desc: &'static str, slot: u16) -> Self {
        self.local_vars.push((start, length, name, desc, slot));
        self
    }
}

/// Writes a minimal but well-formed class file.
pub struct ClassBuilder {
    pool: Vec<u8>,
    next: u16,
    utf8s: HashMap<String, u16>,
    classes: HashMap<String, u16>,
    access: u16,
    this_class: u16,
    super_class: u16,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
}

fn u16b(v: u16) -> [u8; 2] {
    v.to_be_bytes()
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut b = Self {
            pool: Vec::new(),
            next: 1,
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            access: ACC_PUBLIC | 0x0020,
            this_class: 0,
            super_class: 0,
            fields: Vec::new(),
            methods: Vec::new(),
        };
        b.this_class = b.class(name);
        b.super_class = b.class("java/lang/Object");
        b
    }

    fn push_entry(&mut self, bytes: &[u8]) -> u16 {
        self.pool.extend_from_slice(bytes);
        let index = self.next;
        self.next += 1;
        index
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        if let Some(&i) = self.utf8s.get(s) {
            return i;
        }
        let mut entry = vec![1];
        entry.extend_from_slice(&u16b(s.len() as u16));
        entry.extend_from_slice(s.as_bytes());
        let i = self.push_entry(&entry);
        self.utf8s.insert(s.to_string(), i);
        i
    }

    pub fn class(&mut self, name: &str) -> u16 {
        if let Some(&i) = self.classes.get(name) {
            return i;
        }
        let n = self.utf8(name);
        let mut entry = vec![7];
        entry.extend_from_slice(&u16b(n));
        let i = self.push_entry(&entry);
        self.classes.insert(name.to_string(), i);
        i
    }

    pub fn string(&mut self, s: &str) -> u16 {
        let n = self.utf8(s);
        let mut entry = vec![8];
        entry.extend_from_slice(&u16b(n));
        self.push_entry(&entry)
    }

    pub fn integer(&mut self, v: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&v.to_be_bytes());
        self.push_entry(&entry)
    }

    pub fn name_and_type(&mut self, name: &str, desc: &str) -> u16 {
        let n = self.utf8(name);
        let d = self.utf8(desc);
        let mut entry = vec![12];
        entry.extend_from_slice(&u16b(n));
        entry.extend_from_slice(&u16b(d));
        self.push_entry(&entry)
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, desc: &str) -> u16 {
        let c = self.class(owner);
        let nt = self.name_and_type(name, desc);
        let mut entry = vec![tag];
        entry.extend_from_slice(&u16b(c));
        entry.extend_from_slice(&u16b(nt));
        self.push_entry(&entry)
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, desc: &str) -> u16 {
        self.member(9, owner, name, desc)
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, desc: &str) -> u16 {
        self.member(10, owner, name, desc)
    }

    pub fn field(&mut self, access: u16, name: &str, desc: &str) -> &mut Self {
        let mut out = Vec::new();
        out.extend_from_slice(&u16b(access));
        out.extend_from_slice(&u16b(self.utf8(name)));
        out.extend_from_slice(&u16b(self.utf8(desc)));
        out.extend_from_slice(&u16b(0));
        self.fields.push(out);
        self
    }

    pub fn method(&mut self, access: u16, name: &str, desc: &str, code: MethodCode) -> &mut Self {
        let code_name = self.utf8("Code");
        let mut body = Vec::new();
        body.extend_from_slice(&u16b(code.max_stack));
        body.extend_from_slice(&u16b(code.max_locals));
        let code_length = code.declared_length.unwrap_or(code.code.len() as u32);
        body.extend_from_slice(&code_length.to_be_bytes());
        body.extend_from_slice(&code.code);
        body.extend_from_slice(&u16b(code.exception_table.len() as u16));
        for &(start, end, handler, ty) in &code.exception_table {
            let catch_type = ty.map(|t| self.class(t)).unwrap_or(0);
            for v in [start, end, handler, catch_type] {
                body.extend_from_slice(&u16b(v));
            }
        }
        if code.local_vars.is_empty() {
            body.extend_from_slice(&u16b(0));
        } else {
            let lvt_name = self.utf8("LocalVariableTable");
            let mut lvt = Vec::new();
            lvt.extend_from_slice(&u16b(code.local_vars.len() as u16));
            for &(start, length, name, desc, slot) in &code.local_vars {
                let n = self.utf8(name);
                let d = self.utf8(desc);
                for v in [start, length, n, d, slot] {
                    lvt.extend_from_slice(&u16b(v));
                }
            }
            body.extend_from_slice(&u16b(1));
            body.extend_from_slice(&u16b(lvt_name));
            body.extend_from_slice(&(lvt.len() as u32).to_be_bytes());
            body.extend_from_slice(&lvt);
        }

        let mut out = Vec::new();
        out.extend_from_slice(&u16b(access));
        out.extend_from_slice(&u16b(self.utf8(name)));
        out.extend_from_slice(&u16b(self.utf8(desc)));
        out.extend_from_slice(&u16b(1));
        out.extend_from_slice(&u16b(code_name));
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        self.methods.push(out);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00, 0x00, 0x34];
        out.extend_from_slice(&u16b(self.next));
        out.extend_from_slice(&self.pool);
        out.extend_from_slice(&u16b(self.access));
        out.extend_from_slice(&u16b(self.this_class));
        out.extend_from_slice(&u16b(self.super_class));
        out.extend_from_slice(&u16b(0));
        out.extend_from_slice(&u16b(self.fields.len() as u16));
        for f in &self.fields {
            out.extend_from_slice(f);
        }
        out.extend_from_slice(&u16b(self.methods.len() as u16));
        for m in &self.methods {
            out.extend_from_slice(m);
        }
        out.extend_from_slice(&u16b(0));
        out
    }
}

/// `invokestatic`/`getstatic`-style instruction with a pool operand.
pub fn op_ref(opcode: u8, index: u16) -> [u8; 3] {
    let [hi, lo] = index.to_be_bytes();
    [opcode, hi, lo]
}

/// Branch instruction at `at` jumping to `target`.
pub fn branch(opcode: u8, at: u16, target: u16) -> [u8; 3] {
    let [hi, lo] = (target as i16 - at as i16).to_be_bytes();
    [opcode, hi, lo]
}

pub mod op {
    pub const NOP: u8 = 0x00;
    pub const ICONST_0: u8 = 0x03;
    pub const ICONST_1: u8 = 0x04;
    pub const ICONST_2: u8 = 0x05;
    pub const ILOAD_0: u8 = 0x1a;
    pub const ILOAD_1: u8 = 0x1b;
    pub const ILOAD_2: u8 = 0x1c;
    pub const ALOAD_0: u8 = 0x2a;
    pub const ALOAD_1: u8 = 0x2b;
    pub const ALOAD_2: u8 = 0x2c;
    pub const IALOAD: u8 = 0x2e;
    pub const ISTORE_1: u8 = 0x3c;
    pub const ISTORE_2: u8 = 0x3d;
    pub const ASTORE_0: u8 = 0x4b;
    pub const ASTORE_1: u8 = 0x4c;
    pub const ASTORE_2: u8 = 0x4d;
    pub const IASTORE: u8 = 0x4f;
    pub const POP: u8 = 0x57;
    pub const DUP: u8 = 0x59;
    pub const IADD: u8 = 0x60;
    pub const IINC: u8 = 0x84;
    pub const IFGT: u8 = 0x9d;
    pub const IFLE: u8 = 0x9e;
    pub const IF_ICMPGE: u8 = 0xa2;
    pub const GOTO: u8 = 0xa7;
    pub const JSR: u8 = 0xa8;
    pub const RET: u8 = 0xa9;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const NEWARRAY: u8 = 0xbc;
    pub const ARRAYLENGTH: u8 = 0xbe;
    pub const ATHROW: u8 = 0xbf;
    pub const MONITORENTER: u8 = 0xc2;
    pub const MONITOREXIT: u8 = 0xc3;
}

/// Concatenate instruction fragments.
pub fn code(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}
