// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

use crate::usb_device_node_info::{
    DeviceIcon,
    UsbDeviceNodeInfo,
};

/// One entry of the presentation tree produced by an enumeration pass: a
/// display label, an icon category, the variant-typed node payload, and the
/// child entries discovered beneath it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsbTreeNode {
    pub leaf_name: String,
    pub icon: DeviceIcon,
    pub info: UsbDeviceNodeInfo,
    pub children: Vec<UsbTreeNode>,
}
//
impl UsbTreeNode {
    pub fn new(leaf_name: String, icon: DeviceIcon, info: UsbDeviceNodeInfo) -> UsbTreeNode {
        UsbTreeNode { leaf_name, icon, info, children: Vec::new() }
    }

    /// Attaches a child entry and returns a mutable reference to it so the
    /// caller can keep populating the subtree.
    pub fn add_leaf(&mut self, child: UsbTreeNode) -> &mut UsbTreeNode {
        self.children.push(child);
        // the push above guarantees the vector is non-empty
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Number of entries in this subtree, this entry included.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(UsbTreeNode::subtree_len).sum::<usize>()
    }
}
