use crate::dex::class_graph::{ClassId, TypeData};

const OBJECT_VTABLE: u64 = 48;
const METHOD_SIZE: u64 = 52;
const INSTANCE_FIELD_SIZE: u64 = 16;
const VTABLE_SLOT_SIZE: u64 = 4;

/// Framework base classes with notoriously large vtables, matched by name suffix
const VTABLE_PENALTIES: [(&str, u64); 4] = [
    ("Layout", 1500),
    ("View", 1500),
    ("ViewGroup", 1800),
    ("Activity", 1500),
];

fn vtable_penalty(ty: &TypeData) -> Option<u64> {
    let name = ty.class_name.as_ref()?;
    let name: &str = name.as_ref();
    VTABLE_PENALTIES
        .iter()
        .find(|(suffix, _)| name.ends_with(suffix))
        .map(|(_, penalty)| *penalty)
}

/// Rough linear-alloc footprint of a class once loaded, in bytes
pub fn estimate_linear_alloc(class: ClassId) -> u64 {
    let mut size = 0;

    if !class.is_interface() {
        size += vtable_penalty(&class.ty)
            .or_else(|| class.superclass.and_then(|superclass| vtable_penalty(&superclass)))
            .unwrap_or(OBJECT_VTABLE);
        size += class.vmethods.len() as u64 * VTABLE_SLOT_SIZE;
    }

    size += class.dmethods.len() as u64 * METHOD_SIZE;
    size += class.vmethods.len() as u64 * METHOD_SIZE;
    size += class.ifields.len() as u64 * INSTANCE_FIELD_SIZE;
    size
}
