use super::{
    check_type_descriptor, BinaryName, ClassAccessFlags, FieldAccessFlags, MethodAccessFlags,
    Name, UnqualifiedName,
};
use crate::util::RefId;
use crate::Error;
use elsa::{FrozenMap, FrozenVec};
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod framework;
mod overrides;

pub use framework::*;
pub use overrides::*;

/// Handle to an interned type (class, array, or primitive)
pub type TypeId<'g> = RefId<'g, TypeData>;

/// Handle to a class definition
pub type ClassId<'g> = RefId<'g, ClassData<'g>>;

/// Handle to a method, either a definition or a bare reference
pub type MethodId<'g> = RefId<'g, MethodData<'g>>;

/// Handle to a field, either a definition or a bare reference
pub type FieldId<'g> = RefId<'g, FieldData<'g>>;

pub struct ClassGraphArenas<'g> {
    type_arena: Arena<TypeData>,
    class_arena: Arena<ClassData<'g>>,
    method_arena: Arena<MethodData<'g>>,
    field_arena: Arena<FieldData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            type_arena: Arena::new(),
            class_arena: Arena::new(),
            method_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        Self::new()
    }
}

type MemberKey<'g> = (TypeId<'g>, UnqualifiedName, String);

/// Whole-program graph of types, classes, and members
///
/// Every entity is allocated exactly once and handed out as an identity handle, so the same
/// method reference reached from two different classes is the same [`MethodId`]. Reference sets
/// built from these handles deduplicate for free.
///
/// Members must be defined before anything refers to them: once a signature has been interned as
/// a bare reference it can't be upgraded to a definition.
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    types: FrozenMap<String, TypeId<'g>>,
    classes: FrozenMap<TypeId<'g>, ClassId<'g>>,
    methods: FrozenMap<MemberKey<'g>, MethodId<'g>>,
    fields: FrozenMap<MemberKey<'g>, FieldId<'g>>,
    scope: FrozenVec<ClassId<'g>>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            types: FrozenMap::new(),
            classes: FrozenMap::new(),
            methods: FrozenMap::new(),
            fields: FrozenMap::new(),
            scope: FrozenVec::new(),
        }
    }

    /// Get or create the type for a class name
    pub fn intern_type(&'g self, name: &BinaryName) -> TypeId<'g> {
        let descriptor = name.descriptor();
        if let Some(data) = self.types.get(descriptor.as_str()) {
            return RefId(data);
        }
        let data = &*self.arenas.type_arena.alloc(TypeData {
            descriptor: descriptor.clone(),
            class_name: Some(name.clone()),
        });
        self.types.insert(descriptor, RefId(data));
        RefId(data)
    }

    /// Get or create a type from a dex descriptor (eg. `[I` or `Lfoo/Bar;`)
    pub fn intern_type_descriptor(&'g self, descriptor: &str) -> Result<TypeId<'g>, Error> {
        if let Some(data) = self.types.get(descriptor) {
            return Ok(RefId(data));
        }
        check_type_descriptor(descriptor).map_err(Error::MalformedName)?;
        let class_name = match descriptor.strip_prefix('L') {
            Some(rest) => {
                let name = rest.trim_end_matches(';').to_owned();
                Some(BinaryName::from_string(name).map_err(Error::MalformedName)?)
            }
            None => None,
        };
        let data = &*self.arenas.type_arena.alloc(TypeData {
            descriptor: descriptor.to_owned(),
            class_name,
        });
        self.types.insert(descriptor.to_owned(), RefId(data));
        Ok(RefId(data))
    }

    /// Look up a type without creating it
    pub fn lookup_type(&'g self, descriptor: &str) -> Option<TypeId<'g>> {
        self.types.get(descriptor).map(RefId)
    }

    /// Add a method definition or intern a method reference
    ///
    /// Interning a reference to a signature which is already known returns the existing handle
    /// (which may be a definition). Adding a second definition for a signature fails.
    pub fn add_method(&'g self, method: MethodData<'g>) -> Result<MethodId<'g>, Error> {
        let key = (method.class, method.name.clone(), method.descriptor.clone());
        if let Some(existing) = self.methods.get(&key) {
            if method.access_flags.is_some() {
                return Err(Error::ConflictingMember(format!("{:?}", existing)));
            }
            return Ok(RefId(existing));
        }
        let data = &*self.arenas.method_arena.alloc(method);
        self.methods.insert(key, RefId(data));
        Ok(RefId(data))
    }

    /// Add a field definition or intern a field reference
    ///
    /// Same interning rules as [`Self::add_method`].
    pub fn add_field(&'g self, field: FieldData<'g>) -> Result<FieldId<'g>, Error> {
        let key = (field.class, field.name.clone(), field.descriptor.clone());
        if let Some(existing) = self.fields.get(&key) {
            if field.access_flags.is_some() {
                return Err(Error::ConflictingMember(format!("{:?}", existing)));
            }
            return Ok(RefId(existing));
        }
        let data = &*self.arenas.field_arena.alloc(field);
        self.fields.insert(key, RefId(data));
        Ok(RefId(data))
    }

    /// Add a class definition to the graph
    ///
    /// The class becomes part of [`Self::scope`], in insertion order.
    pub fn add_class(&'g self, data: ClassData<'g>) -> Result<ClassId<'g>, Error> {
        if self.classes.get(&data.ty).is_some() {
            return Err(Error::DuplicateDefinition(data.ty.descriptor.clone()));
        }
        let data = RefId(&*self.arenas.class_arena.alloc(data));
        self.classes.insert(data.ty, data);
        self.scope.push(data);
        Ok(data)
    }

    /// Find the class definition of a type, if there is one
    pub fn type_class(&'g self, ty: TypeId<'g>) -> Option<ClassId<'g>> {
        self.classes.get(&ty).map(RefId)
    }

    /// Find a class definition by name
    pub fn lookup_class(&'g self, name: &BinaryName) -> Option<ClassId<'g>> {
        self.lookup_type(&name.descriptor())
            .and_then(|ty| self.type_class(ty))
    }

    /// Superclass definition of a class, if it is defined in the graph
    pub fn super_class(&'g self, class: ClassId<'g>) -> Option<ClassId<'g>> {
        class.superclass.and_then(|ty| self.type_class(ty))
    }

    /// All class definitions, in the order they were added
    pub fn scope(&'g self) -> Vec<ClassId<'g>> {
        (0..self.scope.len())
            .filter_map(|idx| self.scope.get(idx))
            .map(RefId)
            .collect()
    }

    /// Add the framework types the packer knows about
    pub fn insert_framework_types(&'g self) -> Result<FrameworkTypes<'g>, Error> {
        FrameworkTypes::add_to_graph(self)
    }
}

/// Interned type
pub struct TypeData {
    /// Dex type descriptor (eg. `Lcom/example/Foo;`)
    pub descriptor: String,

    /// Class name, for class types
    pub class_name: Option<BinaryName>,
}

impl Debug for TypeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor)
    }
}

impl fmt::Display for TypeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor)
    }
}

pub struct ClassData<'g> {
    /// Type this class defines
    pub ty: TypeId<'g>,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<TypeId<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: Vec<TypeId<'g>>,

    pub access_flags: ClassAccessFlags,

    /// Static, private, and constructor methods
    pub dmethods: Vec<MethodId<'g>>,

    /// Methods dispatched through the vtable
    pub vmethods: Vec<MethodId<'g>>,

    /// Static fields
    pub sfields: Vec<FieldId<'g>>,

    /// Instance fields
    pub ifields: Vec<FieldId<'g>>,

    /// Defined outside of the program being packed (eg. in the framework)
    pub is_external: bool,
}

impl<'g> ClassData<'g> {
    pub fn new(
        ty: TypeId<'g>,
        superclass: Option<TypeId<'g>>,
        access_flags: ClassAccessFlags,
    ) -> ClassData<'g> {
        ClassData {
            ty,
            superclass,
            interfaces: vec![],
            access_flags,
            dmethods: vec![],
            vmethods: vec![],
            sfields: vec![],
            ifields: vec![],
            is_external: false,
        }
    }

    /// Add a method definition, sorting it into direct or virtual methods
    pub fn add_method(&mut self, method: MethodId<'g>) {
        assert_eq!(method.class, self.ty, "Method doesn't belong to this class");
        if method.is_direct() {
            self.dmethods.push(method);
        } else {
            self.vmethods.push(method);
        }
    }

    /// Add a field definition, sorting it into static or instance fields
    pub fn add_field(&mut self, field: FieldId<'g>) {
        assert_eq!(field.class, self.ty, "Field doesn't belong to this class");
        if field.is_static() {
            self.sfields.push(field);
        } else {
            self.ifields.push(field);
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Name of the class
    pub fn name(&self) -> &str {
        self.ty
            .class_name
            .as_ref()
            .map_or(self.ty.descriptor.as_str(), |name| name.as_ref())
    }

    /// Static initializer, if the class declares one
    pub fn clinit(&self) -> Option<MethodId<'g>> {
        self.dmethods
            .iter()
            .copied()
            .find(|method| method.name == UnqualifiedName::CLINIT)
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.ty == other.ty
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ty.descriptor)
    }
}

pub struct MethodData<'g> {
    /// Class
    pub class: TypeId<'g>,

    /// Name of the method
    pub name: UnqualifiedName,

    /// Prototype, written as a descriptor (eg. `(IJ)V`)
    pub descriptor: String,

    /// Access flags, present only on definitions
    pub access_flags: Option<MethodAccessFlags>,
}

impl<'g> MethodData<'g> {
    /// Reference to a method which may or may not be defined in the graph
    pub fn reference(
        class: TypeId<'g>,
        name: UnqualifiedName,
        descriptor: impl Into<String>,
    ) -> MethodData<'g> {
        MethodData {
            class,
            name,
            descriptor: descriptor.into(),
            access_flags: None,
        }
    }

    pub fn is_def(&self) -> bool {
        self.access_flags.is_some()
    }

    pub fn is_static(&self) -> bool {
        self.access_flags
            .map_or(false, |flags| flags.contains(MethodAccessFlags::STATIC))
    }

    pub fn is_direct(&self) -> bool {
        self.name == UnqualifiedName::INIT
            || self.name == UnqualifiedName::CLINIT
            || self.access_flags.map_or(false, |flags| flags.is_direct())
    }
}

impl<'g> Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class.descriptor, self.name, self.descriptor)
    }
}

pub struct FieldData<'g> {
    /// Class
    pub class: TypeId<'g>,

    /// Name of the field
    pub name: UnqualifiedName,

    /// Type of the field, as a descriptor
    pub descriptor: String,

    /// Access flags, present only on definitions
    pub access_flags: Option<FieldAccessFlags>,
}

impl<'g> FieldData<'g> {
    /// Reference to a field which may or may not be defined in the graph
    pub fn reference(
        class: TypeId<'g>,
        name: UnqualifiedName,
        descriptor: impl Into<String>,
    ) -> FieldData<'g> {
        FieldData {
            class,
            name,
            descriptor: descriptor.into(),
            access_flags: None,
        }
    }

    pub fn is_def(&self) -> bool {
        self.access_flags.is_some()
    }

    pub fn is_static(&self) -> bool {
        self.access_flags
            .map_or(false, |flags| flags.contains(FieldAccessFlags::STATIC))
    }
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class.descriptor, self.name, self.descriptor)
    }
}
