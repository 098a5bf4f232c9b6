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

//! Flattening live values into watch entries.
//!
//! Composite values are expanded member by member. Each composite kind keeps its own
//! depth counter, checked against its configured [`RecursionLimit`](crate::RecursionLimit).
//! Expanding an object or a class also emits one `[[ Ancestor ]]` placeholder per
//! super class, and inherited members are placed under the placeholder of the class that
//! declares them.

use std::collections::HashMap;

use scdb_common::{Address, PropertyId, StructId, WatchEntryId, WatchKind};

use super::resolve::{WatchScope, WatchValue};
use crate::{
    vm::{reflect, PropertyDesc, PropertyKind},
    DebuggerFrontEnd, RecursionLimits, ScriptVm, WatchError,
};

/// Class to the watch entry its members are placed under (`None` is the pane root).
type ParentChain = HashMap<StructId, Option<WatchEntryId>>;

#[derive(Debug, Default, Clone, Copy)]
struct Depths {
    object: usize,
    structs: usize,
    class: usize,
    static_array: usize,
    dynamic_array: usize,
}

/// Emits entries into one watch pane of a front end.
pub struct WatchFlattener<'a> {
    vm: &'a dyn ScriptVm,
    front_end: &'a mut dyn DebuggerFrontEnd,
    limits: RecursionLimits,
    kind: WatchKind,
    depths: Depths,
}

impl<'a> WatchFlattener<'a> {
    /// Create a flattener for the `kind` pane
    pub fn new(
        vm: &'a dyn ScriptVm,
        front_end: &'a mut dyn DebuggerFrontEnd,
        limits: RecursionLimits,
        kind: WatchKind,
    ) -> Self {
        Self { vm, front_end, limits, kind, depths: Depths::default() }
    }

    /// Parameters and locals of the frame's function
    pub fn locals(&mut self, scope: &WatchScope) {
        if scope.locals.is_null() {
            return;
        }
        for property in reflect::all_fields(self.vm, scope.function) {
            let Some(desc) = self.vm.property(property) else { continue };
            let out_addr = (desc.is_out_param && !desc.is_return_value)
                .then(|| scope.out_params.iter().find(|(p, _)| *p == property).map(|(_, a)| *a))
                .flatten();
            let addr = out_addr.unwrap_or_else(|| scope.locals.offset(desc.offset));
            self.property(property, addr, None, None, None);
        }
    }

    /// Fields of the frame's object, grouped by declaring class
    pub fn globals(&mut self, scope: &WatchScope) {
        let chain = self.parent_chain(scope.class, None);
        for property in reflect::all_fields(self.vm, scope.class) {
            let Some(desc) = self.vm.property(property) else { continue };
            let parent = chain.get(&desc.owner).copied().flatten();
            let addr = scope.object_base.offset(desc.offset);
            self.property(property, addr, None, parent, None);
        }
    }

    /// One user watch: its resolved value, or the evaluation error as its value
    pub fn user_watch(&mut self, text: &str, value: Result<WatchValue, WatchError>) {
        match value {
            Ok(value) => self.property(value.property, value.addr, value.element, None, Some(text)),
            Err(err) => {
                self.front_end.add_watch_entry(self.kind, None, text, &err.to_string());
            }
        }
    }

    /// Emit `property` stored at `addr` under `parent`, expanding its members.
    ///
    /// `element` is the static or dynamic array element this value is, if any;
    /// `name` replaces the generated entry name.
    pub fn property(
        &mut self,
        property: PropertyId,
        addr: Address,
        element: Option<usize>,
        parent: Option<WatchEntryId>,
        name: Option<&str>,
    ) {
        let Some(desc) = self.vm.property(property).cloned() else { return };

        if desc.is_static_array() && element.is_none() {
            self.static_array(property, &desc, addr, parent, name);
            return;
        }

        let entry_name = match (name, element) {
            (Some(name), _) => format!("{name} ( {},{property},{addr} )", desc.type_name),
            (None, Some(i)) => format!("{}[{i}]", display_name(&desc)),
            (None, None) => {
                format!("{} ( {},{property},{addr} )", display_name(&desc), desc.type_name)
            }
        };
        let value = self.value_text(property, &desc, addr);
        let id = self.front_end.add_watch_entry(self.kind, parent, &entry_name, &value);

        match desc.kind {
            PropertyKind::Struct { struct_id } if self.limits.struct_max.allows(self.depths.structs) => {
                self.depths.structs += 1;
                for field in reflect::all_fields(self.vm, struct_id) {
                    if field == property {
                        continue;
                    }
                    let Some(offset) = self.vm.property(field).map(|d| d.offset) else { continue };
                    self.property(field, addr.offset(offset), None, Some(id), None);
                }
                self.depths.structs -= 1;
            }
            PropertyKind::Class { .. } if self.limits.class_max.allows(self.depths.class) => {
                let Some(class) = self.vm.read_class(addr) else { return };
                self.depths.class += 1;
                self.members(property, class, self.vm.class_defaults(class), id);
                self.depths.class -= 1;
            }
            PropertyKind::Object { .. } if self.limits.object_max.allows(self.depths.object) => {
                let Some(object) = self.vm.read_object(addr) else { return };
                if !self.vm.is_object_valid(object) {
                    return;
                }
                let Some(class) = self.vm.object_class(object) else { return };
                self.depths.object += 1;
                self.members(property, class, self.vm.object_base(object), id);
                self.depths.object -= 1;
            }
            PropertyKind::DynamicArray { inner }
                if self.limits.dynamic_array_max.allows(self.depths.dynamic_array) =>
            {
                let Some(array) = self.vm.read_array(addr) else { return };
                let Some(size) = self.vm.property(inner).map(|d| d.element_size) else { return };
                self.depths.dynamic_array += 1;
                for i in 0..array.len {
                    self.property(inner, array.data.offset(i * size), Some(i), Some(id), None);
                }
                self.depths.dynamic_array -= 1;
            }
            _ => {}
        }
    }

    fn static_array(
        &mut self,
        property: PropertyId,
        desc: &PropertyDesc,
        addr: Address,
        parent: Option<WatchEntryId>,
        name: Option<&str>,
    ) {
        if !self.limits.static_array_max.allows(self.depths.static_array) {
            return;
        }

        let header = match name {
            Some(name) => name.to_string(),
            None => format!("{} ( Static {} Array )", desc.name, desc.type_name),
        };
        let count = format!("{} Elements", desc.array_dim);
        let id = self.front_end.add_watch_entry(self.kind, parent, &header, &count);

        self.depths.static_array += 1;
        for i in 0..desc.array_dim {
            self.property(property, addr.offset(i * desc.element_size), Some(i), Some(id), None);
        }
        self.depths.static_array -= 1;
    }

    /// Members of an object or class, except the expanded property itself and members
    /// declared by the root class.
    fn members(&mut self, property: PropertyId, class: StructId, base: Address, id: WatchEntryId) {
        let chain = self.parent_chain(class, Some(id));
        let root = self.vm.root_class();
        for field in reflect::all_fields(self.vm, class) {
            if field == property {
                continue;
            }
            let Some(desc) = self.vm.property(field) else { continue };
            if Some(desc.owner) == root {
                continue;
            }
            let parent = chain.get(&desc.owner).copied().flatten();
            let addr = base.offset(desc.offset);
            self.property(field, addr, None, parent, None);
        }
    }

    /// Emit one placeholder per ancestor of `class`, each nested under the previous one.
    fn parent_chain(&mut self, class: StructId, parent: Option<WatchEntryId>) -> ParentChain {
        let mut chain = ParentChain::new();
        chain.insert(class, parent);

        let mut parent = parent;
        let mut current = self.vm.struct_desc(class).and_then(|desc| desc.super_struct);
        while let Some(ancestor) = current {
            if chain.contains_key(&ancestor) {
                break;
            }
            let label = format!("[[ {} ]]", reflect::struct_name(self.vm, ancestor));
            parent = Some(self.front_end.add_watch_entry(
                self.kind,
                parent,
                &label,
                "[[ Base Class ]]",
            ));
            chain.insert(ancestor, parent);
            current = self.vm.struct_desc(ancestor).and_then(|desc| desc.super_struct);
        }
        chain
    }

    fn value_text(&self, property: PropertyId, desc: &PropertyDesc, addr: Address) -> String {
        match &desc.kind {
            PropertyKind::Struct { .. } => desc.type_name.clone(),
            PropertyKind::DynamicArray { inner } => {
                let len = self.vm.read_array(addr).map(|a| a.len).unwrap_or_default();
                let inner_type =
                    self.vm.property(*inner).map(|d| d.type_name.clone()).unwrap_or_default();
                let noun = if len == 1 { "Element" } else { "Elements" };
                format!("{len} {inner_type} {noun}")
            }
            PropertyKind::Object { .. } => match self.vm.read_object(addr) {
                None => "None".to_string(),
                Some(object) if !self.vm.is_object_valid(object) => "** Destroyed **".to_string(),
                Some(object) => self.vm.object_name(object),
            },
            _ => self.vm.export_text(property, addr).unwrap_or_default(),
        }
    }
}

fn display_name(desc: &PropertyDesc) -> &str {
    match &desc.kind {
        PropertyKind::Delegate { function_name } => function_name,
        _ => &desc.name,
    }
}
