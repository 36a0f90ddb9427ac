//! Minimal class file assembler for test fixtures.
#![allow(dead_code)]

use std::collections::HashMap;

#[derive(Clone)]
struct MemberSpec {
    name: String,
    descriptor: String,
    signature: Option<String>,
    annotations: Vec<String>,
}

#[derive(Clone)]
pub struct ClassGen {
    name: String,
    super_name: Option<String>,
    access: u16,
    major: u16,
    interfaces: Vec<String>,
    fields: Vec<MemberSpec>,
    methods: Vec<MemberSpec>,
    signature: Option<String>,
    annotations: Vec<String>,
    opaque: Vec<(String, Vec<u8>)>,
    class_refs: Vec<String>,
    method_refs: Vec<(String, String, String)>,
    longs: Vec<i64>,
}

impl ClassGen {
    /// `name` is an internal name such as `com/a/Foo`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            access: 0x0021,
            major: 52,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            signature: None,
            annotations: Vec::new(),
            opaque: Vec::new(),
            class_refs: Vec::new(),
            method_refs: Vec::new(),
            longs: Vec::new(),
        }
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.access = flags;
        self
    }

    pub fn extends(mut self, name: &str) -> Self {
        self.super_name = Some(name.to_string());
        self
    }

    pub fn no_super(mut self) -> Self {
        self.super_name = None;
        self
    }

    pub fn implements(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(member(name, descriptor, None));
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(member(name, descriptor, None));
        self
    }

    pub fn method_with_signature(mut self, name: &str, descriptor: &str, signature: &str) -> Self {
        self.methods.push(member(name, descriptor, Some(signature)));
        self
    }

    pub fn annotated_method(mut self, name: &str, descriptor: &str, annotation: &str) -> Self {
        let mut m = member(name, descriptor, None);
        m.annotations.push(annotation.to_string());
        self.methods.push(m);
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    /// Class-level annotation, given as a field descriptor (`Lcom/x/Ann;`).
    pub fn annotation(mut self, descriptor: &str) -> Self {
        self.annotations.push(descriptor.to_string());
        self
    }

    pub fn opaque_attribute(mut self, name: &str, body: &[u8]) -> Self {
        self.opaque.push((name.to_string(), body.to_vec()));
        self
    }

    /// A `Class` constant not otherwise mentioned, as instructions would add.
    pub fn class_ref(mut self, name: &str) -> Self {
        self.class_refs.push(name.to_string());
        self
    }

    pub fn method_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.method_refs
            .push((owner.to_string(), name.to_string(), descriptor.to_string()));
        self
    }

    pub fn long_constant(mut self, value: i64) -> Self {
        self.longs.push(value);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = Pool::default();
        let this = pool.class(&self.name);
        let super_index = self.super_name.as_deref().map_or(0, |s| pool.class(s));
        let interfaces: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();
        let fields: Vec<Vec<u8>> = self.fields.iter().map(|m| member_bytes(&mut pool, m)).collect();
        let methods: Vec<Vec<u8>> = self.methods.iter().map(|m| member_bytes(&mut pool, m)).collect();

        let mut attrs: Vec<Vec<u8>> = Vec::new();
        if let Some(sig) = &self.signature {
            attrs.push(signature_attribute(&mut pool, sig));
        }
        if !self.annotations.is_empty() {
            attrs.push(annotations_attribute(&mut pool, &self.annotations));
        }
        for (name, body) in &self.opaque {
            let name_index = pool.utf8(name);
            attrs.push(attribute(name_index, body));
        }

        for name in &self.class_refs {
            pool.class(name);
        }
        for (owner, name, descriptor) in &self.method_refs {
            pool.method_ref(owner, name, descriptor);
        }
        for value in &self.longs {
            pool.long(*value);
        }

        let mut out = Vec::new();
        out.extend(0xCAFEBABEu32.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend(self.major.to_be_bytes());
        out.extend(pool.next.to_be_bytes());
        out.extend(&pool.bytes);
        out.extend(self.access.to_be_bytes());
        out.extend(this.to_be_bytes());
        out.extend(super_index.to_be_bytes());
        out.extend((interfaces.len() as u16).to_be_bytes());
        for i in interfaces {
            out.extend(i.to_be_bytes());
        }
        out.extend((fields.len() as u16).to_be_bytes());
        for f in fields {
            out.extend(f);
        }
        out.extend((methods.len() as u16).to_be_bytes());
        for m in methods {
            out.extend(m);
        }
        out.extend((attrs.len() as u16).to_be_bytes());
        for a in attrs {
            out.extend(a);
        }
        out
    }
}

fn member(name: &str, descriptor: &str, signature: Option<&str>) -> MemberSpec {
    MemberSpec {
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        signature: signature.map(str::to_string),
        annotations: Vec::new(),
    }
}

fn member_bytes(pool: &mut Pool, m: &MemberSpec) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(0x0001u16.to_be_bytes());
    out.extend(pool.utf8(&m.name).to_be_bytes());
    out.extend(pool.utf8(&m.descriptor).to_be_bytes());
    let mut attrs = Vec::new();
    if let Some(sig) = &m.signature {
        attrs.push(signature_attribute(pool, sig));
    }
    if !m.annotations.is_empty() {
        attrs.push(annotations_attribute(pool, &m.annotations));
    }
    out.extend((attrs.len() as u16).to_be_bytes());
    for a in attrs {
        out.extend(a);
    }
    out
}

fn signature_attribute(pool: &mut Pool, signature: &str) -> Vec<u8> {
    let name = pool.utf8("Signature");
    let sig = pool.utf8(signature);
    attribute(name, &sig.to_be_bytes())
}

fn annotations_attribute(pool: &mut Pool, descriptors: &[String]) -> Vec<u8> {
    let name = pool.utf8("RuntimeVisibleAnnotations");
    let mut body = Vec::new();
    body.extend((descriptors.len() as u16).to_be_bytes());
    for d in descriptors {
        body.extend(pool.utf8(d).to_be_bytes());
        body.extend(0u16.to_be_bytes());
    }
    attribute(name, &body)
}

fn attribute(name_index: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(name_index.to_be_bytes());
    out.extend((body.len() as u32).to_be_bytes());
    out.extend(body);
    out
}

struct Pool {
    bytes: Vec<u8>,
    next: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            next: 1,
            utf8: HashMap::new(),
            classes: HashMap::new(),
        }
    }
}

impl Pool {
    fn utf8(&mut self, text: &str) -> u16 {
        if let Some(index) = self.utf8.get(text) {
            return *index;
        }
        self.bytes.push(1);
        self.bytes.extend((text.len() as u16).to_be_bytes());
        self.bytes.extend(text.as_bytes());
        let index = self.take(1);
        self.utf8.insert(text.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let name_index = self.utf8(name);
        self.bytes.push(7);
        self.bytes.extend(name_index.to_be_bytes());
        let index = self.take(1);
        self.classes.insert(name.to_string(), index);
        index
    }

    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.bytes.push(12);
        self.bytes.extend(name_index.to_be_bytes());
        self.bytes.extend(descriptor_index.to_be_bytes());
        let nat = self.take(1);
        self.bytes.push(10);
        self.bytes.extend(class_index.to_be_bytes());
        self.bytes.extend(nat.to_be_bytes());
        self.take(1)
    }

    fn long(&mut self, value: i64) -> u16 {
        self.bytes.push(5);
        self.bytes.extend(value.to_be_bytes());
        self.take(2)
    }

    fn take(&mut self, slots: u16) -> u16 {
        let index = self.next;
        self.next += slots;
        index
    }
}
