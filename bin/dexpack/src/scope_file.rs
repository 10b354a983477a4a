//! Plain-text inputs: the program description, the startup order, and the primary class list
//!
//! A program description lists classes, each followed by indented lines for its members and
//! the references its code makes:
//!
//! ```text
//! # comment
//! class com/example/Main extends android/app/Activity implements com/example/Listener
//!   clinit writes-own-statics
//!   method onCreate (Landroid/os/Bundle;)V
//!   method helper ()V static private
//!   field INSTANCE Lcom/example/Main; static
//!   mref com/example/Util log (Ljava/lang/String;)V
//!   fref com/example/Config DEBUG Z
//!   tref [Ljava/lang/String;
//!   init com/example/Config
//! ```
//!
//! Class modifiers (`interface`, `abstract`, `final`) may trail the class line. A `clinit` line
//! declares a static initializer along with its effects (none listed means it only touches the
//! class's own statics).

use crate::error::CliError;
use dexpack::dex::class_graph::{ClassData, ClassGraph, ClassId, FieldData, MethodData};
use dexpack::dex::{
    check_type_descriptor, BinaryName, ClassAccessFlags, FieldAccessFlags, MethodAccessFlags,
    Name, UnqualifiedName,
};
use dexpack::init_classes::{Effects, MethodSummary, SummaryOracle};
use dexpack::interdex::{ClassRefs, OrderEntry};
use std::collections::HashMap;

pub struct ClassDecl {
    pub name: BinaryName,
    pub superclass: Option<BinaryName>,
    pub interfaces: Vec<BinaryName>,
    pub access_flags: ClassAccessFlags,
    pub clinit: Option<Effects>,
    pub methods: Vec<(UnqualifiedName, String, MethodAccessFlags)>,
    pub fields: Vec<(UnqualifiedName, String, FieldAccessFlags)>,
    pub method_refs: Vec<MemberRef>,
    pub field_refs: Vec<MemberRef>,
    pub type_refs: Vec<String>,
    pub init_types: Vec<BinaryName>,
}

pub struct MemberRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: String,
}

struct Parser<'s> {
    file: &'s str,
    line: usize,
}

impl<'s> Parser<'s> {
    fn error(&self, message: impl Into<String>) -> CliError {
        CliError::Parse {
            file: self.file.to_owned(),
            line: self.line,
            message: message.into(),
        }
    }

    fn binary_name(&self, name: &str) -> Result<BinaryName, CliError> {
        BinaryName::from_string(name.to_owned()).map_err(|msg| self.error(msg))
    }

    fn unqualified_name(&self, name: &str) -> Result<UnqualifiedName, CliError> {
        UnqualifiedName::from_string(name.to_owned()).map_err(|msg| self.error(msg))
    }

    fn type_descriptor(&self, descriptor: &str) -> Result<String, CliError> {
        check_type_descriptor(descriptor).map_err(|msg| self.error(msg))?;
        Ok(descriptor.to_owned())
    }

    fn expect<'w>(&self, word: Option<&'w str>, what: &str) -> Result<&'w str, CliError> {
        word.ok_or_else(|| self.error(format!("Missing {}", what)))
    }

    fn class_line<'w>(
        &self,
        mut words: impl Iterator<Item = &'w str>,
    ) -> Result<ClassDecl, CliError> {
        let name = self.binary_name(self.expect(words.next(), "class name")?)?;
        let mut decl = ClassDecl {
            superclass: if name == BinaryName::OBJECT {
                None
            } else {
                Some(BinaryName::OBJECT)
            },
            name,
            interfaces: vec![],
            access_flags: ClassAccessFlags::PUBLIC,
            clinit: None,
            methods: vec![],
            fields: vec![],
            method_refs: vec![],
            field_refs: vec![],
            type_refs: vec![],
            init_types: vec![],
        };

        while let Some(word) = words.next() {
            match word {
                "extends" => {
                    let superclass = self.expect(words.next(), "superclass")?;
                    decl.superclass = Some(self.binary_name(superclass)?);
                }
                "implements" => {
                    for interface in self.expect(words.next(), "interfaces")?.split(',') {
                        decl.interfaces.push(self.binary_name(interface)?);
                    }
                }
                "interface" => {
                    decl.access_flags |= ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT
                }
                "abstract" => decl.access_flags |= ClassAccessFlags::ABSTRACT,
                "final" => decl.access_flags |= ClassAccessFlags::FINAL,
                other => return Err(self.error(format!("Unknown class modifier '{}'", other))),
            }
        }
        Ok(decl)
    }

    fn effects<'w>(&self, words: impl Iterator<Item = &'w str>) -> Result<Effects, CliError> {
        let mut effects = Effects::WRITES_OWN_STATICS;
        for word in words {
            effects |= match word {
                "writes-own-statics" => Effects::WRITES_OWN_STATICS,
                "writes-foreign-state" => Effects::WRITES_FOREIGN_STATE,
                "throws" => Effects::THROWS,
                "native" => Effects::NATIVE,
                "unknown" => Effects::UNKNOWN,
                other => return Err(self.error(format!("Unknown effect '{}'", other))),
            };
        }
        Ok(effects)
    }

    fn method_flags<'w>(
        &self,
        words: impl Iterator<Item = &'w str>,
    ) -> Result<MethodAccessFlags, CliError> {
        let mut flags = MethodAccessFlags::empty();
        for word in words {
            flags |= match word {
                "public" => MethodAccessFlags::PUBLIC,
                "private" => MethodAccessFlags::PRIVATE,
                "protected" => MethodAccessFlags::PROTECTED,
                "static" => MethodAccessFlags::STATIC,
                "final" => MethodAccessFlags::FINAL,
                "native" => MethodAccessFlags::NATIVE,
                "abstract" => MethodAccessFlags::ABSTRACT,
                "constructor" => MethodAccessFlags::CONSTRUCTOR,
                other => return Err(self.error(format!("Unknown method modifier '{}'", other))),
            };
        }
        if flags.is_empty() {
            flags = MethodAccessFlags::PUBLIC;
        }
        Ok(flags)
    }

    fn field_flags<'w>(
        &self,
        words: impl Iterator<Item = &'w str>,
    ) -> Result<FieldAccessFlags, CliError> {
        let mut flags = FieldAccessFlags::empty();
        for word in words {
            flags |= match word {
                "public" => FieldAccessFlags::PUBLIC,
                "private" => FieldAccessFlags::PRIVATE,
                "protected" => FieldAccessFlags::PROTECTED,
                "static" => FieldAccessFlags::STATIC,
                "final" => FieldAccessFlags::FINAL,
                "volatile" => FieldAccessFlags::VOLATILE,
                other => return Err(self.error(format!("Unknown field modifier '{}'", other))),
            };
        }
        if flags.is_empty() {
            flags = FieldAccessFlags::PUBLIC;
        }
        Ok(flags)
    }

    fn member_ref<'w>(
        &self,
        words: &mut impl Iterator<Item = &'w str>,
    ) -> Result<MemberRef, CliError> {
        Ok(MemberRef {
            owner: self.binary_name(self.expect(words.next(), "owner")?)?,
            name: self.unqualified_name(self.expect(words.next(), "member name")?)?,
            descriptor: self.expect(words.next(), "descriptor")?.to_owned(),
        })
    }
}

/// Parse a program description
pub fn parse_scope(file: &str, text: &str) -> Result<Vec<ClassDecl>, CliError> {
    let mut parser = Parser { file, line: 0 };
    let mut classes: Vec<ClassDecl> = vec![];

    for (idx, line) in text.lines().enumerate() {
        parser.line = idx + 1;
        let mut words = line.split_whitespace();
        let keyword = match words.next() {
            None => continue,
            Some(word) if word.starts_with('#') => continue,
            Some(word) => word,
        };

        if keyword == "class" {
            classes.push(parser.class_line(words)?);
            continue;
        }

        let class = match classes.last_mut() {
            Some(class) => class,
            None => return Err(parser.error(format!("'{}' outside of a class", keyword))),
        };
        match keyword {
            "clinit" => class.clinit = Some(parser.effects(words)?),
            "method" => {
                let name = parser.unqualified_name(parser.expect(words.next(), "method name")?)?;
                let descriptor = parser.expect(words.next(), "descriptor")?.to_owned();
                let flags = parser.method_flags(words)?;
                class.methods.push((name, descriptor, flags));
            }
            "field" => {
                let name = parser.unqualified_name(parser.expect(words.next(), "field name")?)?;
                let descriptor = parser.expect(words.next(), "descriptor")?;
                let descriptor = parser.type_descriptor(descriptor)?;
                let flags = parser.field_flags(words)?;
                class.fields.push((name, descriptor, flags));
            }
            "mref" => class.method_refs.push(parser.member_ref(&mut words)?),
            "fref" => class.field_refs.push(parser.member_ref(&mut words)?),
            "tref" => {
                let descriptor = parser.expect(words.next(), "descriptor")?;
                class.type_refs.push(parser.type_descriptor(descriptor)?);
            }
            "init" => {
                let name = parser.binary_name(parser.expect(words.next(), "class name")?)?;
                class.init_types.push(name);
            }
            other => return Err(parser.error(format!("Unknown directive '{}'", other))),
        }
    }

    Ok(classes)
}

/// Parse a list of classes, one per line, with optional marker lines in between
///
/// Classes may be written as `com/example/Foo`, `com/example/Foo.class`, or `Lcom/example/Foo;`.
pub fn parse_class_list(file: &str, text: &str) -> Result<Vec<OrderEntry>, CliError> {
    let mut parser = Parser { file, line: 0 };
    let mut entries = vec![];

    for (idx, line) in text.lines().enumerate() {
        parser.line = idx + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let entry = if line.starts_with("DexEndMarker") {
            OrderEntry::DexEndMarker
        } else if line.starts_with("ScrollListStart") {
            OrderEntry::ScrollStart
        } else if line.starts_with("ScrollListEnd") {
            OrderEntry::ScrollEnd
        } else if line.starts_with("BackgroundSetStart") {
            OrderEntry::BackgroundStart
        } else if line.starts_with("BackgroundSetEnd") {
            OrderEntry::BackgroundEnd
        } else {
            let name = line.strip_suffix(".class").unwrap_or(line);
            let name = name
                .strip_prefix('L')
                .and_then(|name| name.strip_suffix(';'))
                .unwrap_or(name);
            OrderEntry::Class(parser.binary_name(name)?)
        };
        entries.push(entry);
    }

    Ok(entries)
}

/// Program description loaded into a class graph
pub struct LoadedProgram<'g> {
    /// Classes in declaration order
    pub classes: Vec<ClassId<'g>>,

    /// References made by the code of each class
    pub code_refs: HashMap<ClassId<'g>, ClassRefs<'g>>,

    /// Summaries of the declared static initializers
    pub oracle: SummaryOracle<'g>,
}

/// Add declared classes to the graph
///
/// All definitions go in before any reference gets interned, so references to declared members
/// resolve to the definitions.
pub fn load<'g>(
    class_graph: &'g ClassGraph<'g>,
    decls: &[ClassDecl],
) -> Result<LoadedProgram<'g>, CliError> {
    let mut classes = vec![];
    let mut oracle = SummaryOracle::new();

    for decl in decls {
        let ty = class_graph.intern_type(&decl.name);
        let superclass = decl
            .superclass
            .as_ref()
            .map(|superclass| class_graph.intern_type(superclass));
        let mut data = ClassData::new(ty, superclass, decl.access_flags);
        data.interfaces = decl
            .interfaces
            .iter()
            .map(|interface| class_graph.intern_type(interface))
            .collect();

        if let Some(effects) = decl.clinit {
            let clinit = class_graph.add_method(MethodData {
                class: ty,
                name: UnqualifiedName::CLINIT,
                descriptor: String::from("()V"),
                access_flags: Some(MethodAccessFlags::STATIC | MethodAccessFlags::CONSTRUCTOR),
            })?;
            data.add_method(clinit);
            oracle.insert(
                clinit,
                MethodSummary {
                    effects,
                    calls: vec![],
                },
            );
        }
        for (name, descriptor, access_flags) in &decl.methods {
            let method = class_graph.add_method(MethodData {
                class: ty,
                name: name.clone(),
                descriptor: descriptor.clone(),
                access_flags: Some(*access_flags),
            })?;
            data.add_method(method);
        }
        for (name, descriptor, access_flags) in &decl.fields {
            let field = class_graph.add_field(FieldData {
                class: ty,
                name: name.clone(),
                descriptor: descriptor.clone(),
                access_flags: Some(*access_flags),
            })?;
            data.add_field(field);
        }

        classes.push(class_graph.add_class(data)?);
    }

    let mut code_refs = HashMap::new();
    for (decl, class) in decls.iter().zip(&classes) {
        let mut refs = ClassRefs::default();
        for method in &decl.method_refs {
            refs.methods.insert(class_graph.add_method(MethodData::reference(
                class_graph.intern_type(&method.owner),
                method.name.clone(),
                method.descriptor.clone(),
            ))?);
        }
        for field in &decl.field_refs {
            refs.fields.insert(class_graph.add_field(FieldData::reference(
                class_graph.intern_type(&field.owner),
                field.name.clone(),
                field.descriptor.clone(),
            ))?);
        }
        for descriptor in &decl.type_refs {
            refs.types
                .insert(class_graph.intern_type_descriptor(descriptor)?);
        }
        for name in &decl.init_types {
            refs.init_types.insert(class_graph.intern_type(name));
        }
        code_refs.insert(*class, refs);
    }

    log::info!("Loaded {} classes", classes.len());
    Ok(LoadedProgram {
        classes,
        code_refs,
        oracle,
    })
}
