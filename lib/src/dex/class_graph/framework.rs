use super::{ClassData, ClassGraph, ClassId};
use crate::dex::{BinaryName, ClassAccessFlags};
use crate::Error;

/// Framework classes the packer has an opinion about
///
/// These are all external: they ship with the platform, so they never get packed themselves, but
/// program classes extend them and their names feed the linear-alloc estimate.
pub struct FrameworkTypes<'g> {
    pub object: ClassId<'g>,
    pub enum_: ClassId<'g>,
    pub activity: ClassId<'g>,
    pub view: ClassId<'g>,
    pub view_group: ClassId<'g>,
    pub linear_layout: ClassId<'g>,
}

impl<'g> FrameworkTypes<'g> {
    pub fn add_to_graph(class_graph: &'g ClassGraph<'g>) -> Result<FrameworkTypes<'g>, Error> {
        let external = |name: &BinaryName, superclass: Option<ClassId<'g>>, access_flags| {
            let mut data = ClassData::new(
                class_graph.intern_type(name),
                superclass.map(|class| class.ty),
                access_flags,
            );
            data.is_external = true;
            class_graph.add_class(data)
        };

        let object = external(&BinaryName::OBJECT, None, ClassAccessFlags::PUBLIC)?;
        let enum_ = external(
            &BinaryName::ENUM,
            Some(object),
            ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT,
        )?;
        let activity = external(&BinaryName::ACTIVITY, Some(object), ClassAccessFlags::PUBLIC)?;
        let view = external(&BinaryName::VIEW, Some(object), ClassAccessFlags::PUBLIC)?;
        let view_group = external(
            &BinaryName::VIEWGROUP,
            Some(view),
            ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT,
        )?;
        let linear_layout = external(
            &BinaryName::LINEARLAYOUT,
            Some(view_group),
            ClassAccessFlags::PUBLIC,
        )?;

        Ok(FrameworkTypes {
            object,
            enum_,
            activity,
            view,
            view_group,
            linear_layout,
        })
    }
}
