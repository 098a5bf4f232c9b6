// SCDB - Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The script VM seam.
//!
//! The debugger core treats the VM as two things: a source of per-instruction
//! notifications (see [`crate::DebugEvent`]) and a reflection/memory provider, modelled by
//! the [`ScriptVm`] trait below. Everything is addressed through the non-owning handles of
//! [`scdb_common::types`], and every lookup may fail once the VM has torn the target down.
//!
//! # Memory model
//!
//! Script memory is a flat address space. A property lives at `base + offset`, where
//! `base` is an object's base address, a class's default-value block, a function frame's
//! locals block or the address of an enclosing struct value. Elements of static arrays
//! follow each other at `element_size` strides. Dynamic arrays are a header read through
//! [`ScriptVm::read_array`].

use eyre::Result;
use scdb_common::{Address, FrameId, ObjectId, PropertyId, StructId};

/// What a reflected struct is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructKind {
    /// A class, living in a package
    Class {
        /// Package name
        package: String,
    },
    /// A plain script struct
    ScriptStruct,
    /// A function; its fields are parameters and locals
    Function,
    /// A state's code body
    State,
}

/// A reflected struct (class, struct, function or state).
#[derive(Debug, Clone)]
pub struct StructDesc {
    /// Short name
    pub name: String,
    /// What the struct is
    pub kind: StructKind,
    /// Super struct (super class for classes)
    pub super_struct: Option<StructId>,
    /// Fields declared by this struct itself, in declaration order
    pub fields: Vec<PropertyId>,
}

/// Shape of a reflected property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// Anything exported as plain text (ints, floats, names, strings, enums, ...)
    Scalar,
    /// Reference to an object of (at least) the given class
    Object {
        /// Declared class
        class: StructId,
    },
    /// Reference to a class; members resolve through the class defaults
    Class {
        /// Declared meta class
        meta_class: StructId,
    },
    /// Inline struct value
    Struct {
        /// Struct descriptor
        struct_id: StructId,
    },
    /// Dynamic array of `inner`
    DynamicArray {
        /// Element property
        inner: PropertyId,
    },
    /// Delegate; displayed by its function name
    Delegate {
        /// Bound function name
        function_name: String,
    },
}

/// A reflected property.
#[derive(Debug, Clone)]
pub struct PropertyDesc {
    /// Property name
    pub name: String,
    /// Short type name shown next to the name (e.g. `Int`, `Vector`, `Object`)
    pub type_name: String,
    /// Shape
    pub kind: PropertyKind,
    /// Struct declaring this property
    pub owner: StructId,
    /// Byte offset from the owning base address
    pub offset: usize,
    /// Size of one element
    pub element_size: usize,
    /// Static array dimension; 1 for non-arrays
    pub array_dim: usize,
    /// Function parameter passed by reference
    pub is_out_param: bool,
    /// Function return value
    pub is_return_value: bool,
}

impl PropertyDesc {
    /// Whether this is a fixed-size array of more than one element
    pub fn is_static_array(&self) -> bool {
        self.array_dim > 1
    }
}

/// What kind of code a frame executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A function invocation
    Function,
    /// An object's state code
    State,
    /// Evaluation of a class's default properties
    ClassScope,
}

/// A VM frame record, as seen by the debugger.
#[derive(Debug, Clone)]
pub struct FrameDesc {
    /// Executing object
    pub object: ObjectId,
    /// Function or state being executed
    pub node: StructId,
    /// Frame flavour
    pub kind: FrameKind,
    /// Class owning the executing code
    pub owner_class: StructId,
    /// Base address of parameters and locals
    pub locals: Address,
    /// Caller-provided addresses of out parameters
    pub out_params: Vec<(PropertyId, Address)>,
    /// Whether a latent action is pending on this (state) frame
    pub latent_pending: bool,
}

impl FrameDesc {
    /// Whether this frame executes state code
    pub fn is_state(&self) -> bool {
        self.kind == FrameKind::State
    }
}

/// Header of a dynamic array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptArray {
    /// Address of element 0
    pub data: Address,
    /// Number of elements
    pub len: usize,
}

/// Reflection and memory access the debugger needs from a script VM.
///
/// All methods are synchronous and called on the script thread. Lookups return `None`
/// when the handle no longer denotes a live target.
pub trait ScriptVm {
    /// Describe a live frame record
    fn frame(&self, frame: FrameId) -> Option<FrameDesc>;

    /// Describe a struct, class, function or state
    fn struct_desc(&self, id: StructId) -> Option<&StructDesc>;

    /// Describe a property
    fn property(&self, id: PropertyId) -> Option<&PropertyDesc>;

    /// The root class every object derives from; its members are hidden when expanding
    /// objects and classes
    fn root_class(&self) -> Option<StructId>;

    /// Class of a live object
    fn object_class(&self, object: ObjectId) -> Option<StructId>;

    /// Display name of an object
    fn object_name(&self, object: ObjectId) -> String;

    /// Base address of an object's fields
    fn object_base(&self, object: ObjectId) -> Address;

    /// Whether an object is still alive (not pending destruction)
    fn is_object_valid(&self, object: ObjectId) -> bool;

    /// Base address of a class's default values
    fn class_defaults(&self, class: StructId) -> Address;

    /// Whether scripts of this class were compiled with debug information
    fn has_debug_info(&self, _class: StructId) -> bool {
        true
    }

    /// Read an object reference stored at `addr`
    fn read_object(&self, addr: Address) -> Option<ObjectId>;

    /// Read a class reference stored at `addr`
    fn read_class(&self, addr: Address) -> Option<StructId>;

    /// Read a dynamic array header stored at `addr`
    fn read_array(&self, addr: Address) -> Option<ScriptArray>;

    /// Export the value of `property` stored at `addr` as text
    fn export_text(&self, property: PropertyId, addr: Address) -> Option<String>;

    /// Import `text` into the value of `property` stored at `addr`
    fn import_text(&mut self, property: PropertyId, addr: Address, text: &str) -> Result<()>;

    /// Toggle the host's per-frame tick while the debugger holds execution
    fn set_tick_enabled(&mut self, _enabled: bool) {}

    /// Ask the host process to shut down
    fn request_shutdown(&mut self) {}

    /// Whether the host is already shutting down
    fn is_shutting_down(&self) -> bool {
        false
    }
}

/// Helpers derived from the raw reflection queries.
pub(crate) mod reflect {
    use super::*;

    /// All fields of a struct including inherited ones, most derived first.
    pub(crate) fn all_fields(vm: &dyn ScriptVm, id: StructId) -> Vec<PropertyId> {
        let mut fields = Vec::new();
        let mut current = Some(id);
        while let Some(desc) = current.and_then(|id| vm.struct_desc(id)) {
            fields.extend(desc.fields.iter().copied());
            current = desc.super_struct;
        }
        fields
    }

    /// Find a field by name, searching super structs. Script names are case-insensitive.
    pub(crate) fn find_field(vm: &dyn ScriptVm, id: StructId, name: &str) -> Option<PropertyId> {
        all_fields(vm, id).into_iter().find(|prop| {
            vm.property(*prop).is_some_and(|desc| desc.name.eq_ignore_ascii_case(name))
        })
    }

    /// Short name of a struct, or a placeholder for a dead handle
    pub(crate) fn struct_name(vm: &dyn ScriptVm, id: StructId) -> String {
        vm.struct_desc(id).map(|desc| desc.name.clone()).unwrap_or_else(|| format!("<{id}>"))
    }

    /// Package of a class; empty for anything else
    pub(crate) fn package_name(vm: &dyn ScriptVm, class: StructId) -> String {
        match vm.struct_desc(class).map(|desc| &desc.kind) {
            Some(StructKind::Class { package }) => package.clone(),
            _ => String::new(),
        }
    }

    /// `Package.Class`, the key breakpoints are stored under
    pub(crate) fn class_path(vm: &dyn ScriptVm, class: StructId) -> String {
        let package = package_name(vm, class);
        let name = struct_name(vm, class);
        if package.is_empty() {
            name
        } else {
            format!("{package}.{name}")
        }
    }
}
