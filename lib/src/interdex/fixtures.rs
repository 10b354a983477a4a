//! Small programs for exercising the packer

use crate::dex::class_graph::{
    ClassData, ClassGraph, ClassId, FieldData, FieldId, MethodData, MethodId, OverrideGraph,
    TypeId,
};
use crate::dex::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, Name, UnqualifiedName,
};
use crate::init_classes::ClinitOracle;
use std::collections::HashSet;

pub struct Program<'g> {
    pub graph: &'g ClassGraph<'g>,
    pub object: TypeId<'g>,
}

impl<'g> Program<'g> {
    pub fn new(graph: &'g ClassGraph<'g>) -> Program<'g> {
        let object = graph.insert_framework_types().unwrap().object.ty;
        Program { graph, object }
    }

    pub fn ty(&self, name: &str) -> TypeId<'g> {
        self.graph
            .intern_type(&BinaryName::from_string(name.to_owned()).unwrap())
    }

    /// Plain public class extending `Object`
    pub fn class(&self, name: &str) -> ClassId<'g> {
        self.class_with(name, None, false, &[])
    }

    /// Class with an optional superclass, an optional `<clinit>`, and some static `int` fields
    pub fn class_with(
        &self,
        name: &str,
        superclass: Option<TypeId<'g>>,
        clinit: bool,
        static_fields: &[&str],
    ) -> ClassId<'g> {
        let ty = self.ty(name);
        let mut data = ClassData::new(
            ty,
            Some(superclass.unwrap_or(self.object)),
            ClassAccessFlags::PUBLIC,
        );
        if clinit {
            let clinit = self
                .graph
                .add_method(MethodData {
                    class: ty,
                    name: UnqualifiedName::CLINIT,
                    descriptor: String::from("()V"),
                    access_flags: Some(MethodAccessFlags::STATIC | MethodAccessFlags::CONSTRUCTOR),
                })
                .unwrap();
            data.add_method(clinit);
        }
        for field in static_fields {
            let field = self
                .graph
                .add_field(FieldData {
                    class: ty,
                    name: UnqualifiedName::from_string((*field).to_owned()).unwrap(),
                    descriptor: String::from("I"),
                    access_flags: Some(FieldAccessFlags::STATIC | FieldAccessFlags::PUBLIC),
                })
                .unwrap();
            data.add_field(field);
        }
        self.graph.add_class(data).unwrap()
    }

    /// Reference to `owner.name()V`
    pub fn method_ref(&self, owner: &str, name: &str) -> MethodId<'g> {
        self.graph
            .add_method(MethodData::reference(
                self.ty(owner),
                UnqualifiedName::from_string(name.to_owned()).unwrap(),
                "()V",
            ))
            .unwrap()
    }

    /// Reference to `owner.name:I`
    pub fn field_ref(&self, owner: &str, name: &str) -> FieldId<'g> {
        self.graph
            .add_field(FieldData::reference(
                self.ty(owner),
                UnqualifiedName::from_string(name.to_owned()).unwrap(),
                "I",
            ))
            .unwrap()
    }
}

/// Every initializer has side effects, except for the listed classes
pub struct BenignClinits<'g>(pub HashSet<TypeId<'g>>);

impl<'g> ClinitOracle<'g> for BenignClinits<'g> {
    fn clinit_has_no_side_effects(
        &self,
        class: ClassId<'g>,
        _override_graph: Option<&OverrideGraph<'g>>,
    ) -> bool {
        self.0.contains(&class.ty)
    }
}
