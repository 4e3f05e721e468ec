// src/list.rs

//! Typed views over native linked lists
//!
//! [`RawList`] walks an `alpm_list_t` chain and frees its nodes when it
//! owns them. [`AlpmList`] pairs a chain with the binding of the objects it
//! holds and a wrapper for each element. Its iterator re-checks the binding
//! before every step, so a list that outlives its session or database
//! yields an error instead of reading freed memory.

use std::ffi::{c_char, c_void};
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::ptr;

use crate::error::Result;
use crate::ffi;
use crate::handle::Binding;
use crate::version::Depend;

/// An `alpm_list_t` chain, borrowed from libalpm or owned by us
pub(crate) struct RawList {
    head: *mut ffi::alpm_list_t,
    owned: bool,
}

impl RawList {
    /// # Safety
    ///
    /// `head` must be NULL or a valid chain that outlives the view.
    pub(crate) unsafe fn borrowed(head: *mut ffi::alpm_list_t) -> Self {
        Self { head, owned: false }
    }

    /// Take ownership of the nodes; the elements stay with their owner
    ///
    /// # Safety
    ///
    /// `head` must be NULL or a chain whose nodes the caller may free.
    pub(crate) unsafe fn owned(head: *mut ffi::alpm_list_t) -> Self {
        Self { head, owned: true }
    }

    /// Build an owned chain referencing `items`
    pub(crate) fn from_ptrs<T>(items: impl IntoIterator<Item = *mut T>) -> Self {
        let mut head: *mut ffi::alpm_list_t = ptr::null_mut();
        for item in items {
            head = unsafe { ffi::alpm_list_add(head, item.cast()) };
        }
        Self { head, owned: true }
    }

    pub(crate) fn head(&self) -> *mut ffi::alpm_list_t {
        self.head
    }

    pub(crate) fn nodes(&self) -> Nodes<'_> {
        Nodes {
            node: self.head,
            _list: PhantomData,
        }
    }

    /// Owned copy of the chain, sharing the elements
    pub(crate) fn copy(&self) -> RawList {
        RawList::from_ptrs(self.nodes())
    }

    /// # Safety
    ///
    /// Every element must be a NUL-terminated string.
    pub(crate) unsafe fn strings(&self) -> Vec<String> {
        self.nodes()
            .filter_map(|s| unsafe { ffi::to_string(s.cast::<c_char>()) })
            .collect()
    }

    /// # Safety
    ///
    /// Every element must be a live `alpm_depend_t`.
    pub(crate) unsafe fn depends(&self) -> Vec<Depend> {
        self.nodes()
            .filter_map(|dep| unsafe { Depend::from_raw(dep.cast::<ffi::alpm_depend_t>()) })
            .collect()
    }

    /// Copy out a caller-owned list of strings, freeing it
    ///
    /// # Safety
    ///
    /// `head` must be a chain of malloc'd strings handed over by libalpm.
    pub(crate) unsafe fn take_strings(head: *mut ffi::alpm_list_t) -> Vec<String> {
        let list = unsafe { RawList::owned(head) };
        let strings = unsafe { list.strings() };
        unsafe { ffi::alpm_list_free_inner(list.head, Some(ffi::free)) };
        strings
    }
}

impl Drop for RawList {
    fn drop(&mut self) {
        if self.owned && !self.head.is_null() {
            unsafe { ffi::alpm_list_free(self.head) };
        }
    }
}

/// Forward walk over the element pointers of a [`RawList`]
pub(crate) struct Nodes<'a> {
    node: *const ffi::alpm_list_t,
    _list: PhantomData<&'a RawList>,
}

impl Iterator for Nodes<'_> {
    type Item = *mut c_void;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        // SAFETY: the chain is valid for the lifetime of the RawList
        let node = unsafe { &*self.node };
        self.node = node.next;
        Some(node.data)
    }
}

/// A native list of bound objects
pub struct AlpmList<T> {
    raw: RawList,
    binding: Binding,
    wrap: fn(*mut c_void, &Binding) -> T,
}

impl<T> AlpmList<T> {
    pub(crate) fn new(raw: RawList, binding: Binding, wrap: fn(*mut c_void, &Binding) -> T) -> Self {
        Self { raw, binding, wrap }
    }

    pub(crate) fn raw(&self) -> &RawList {
        &self.raw
    }

    pub(crate) fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Iterate the elements in list order
    ///
    /// Fails up front if the list is already stale. If it goes stale while
    /// iterating, the next item is that error and the walk ends there.
    pub fn iter(&self) -> Result<Iter<'_, T>> {
        self.binding.check()?;
        Ok(Iter {
            nodes: self.raw.nodes(),
            list: self,
            done: false,
        })
    }

    /// Visit each element until `f` breaks
    pub fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(T) -> ControlFlow<()>,
    {
        let mut nodes = self.raw.nodes();
        loop {
            self.binding.check()?;
            let Some(data) = nodes.next() else {
                return Ok(());
            };
            if f((self.wrap)(data, &self.binding)).is_break() {
                return Ok(());
            }
        }
    }

    /// Materialize the elements in list order
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        self.for_each(|item| {
            items.push(item);
            ControlFlow::Continue(())
        })?;
        Ok(items)
    }

    pub fn len(&self) -> Result<usize> {
        self.binding.check()?;
        Ok(self.raw.nodes().count())
    }

    pub fn is_empty(&self) -> bool {
        self.raw.head.is_null()
    }
}

impl<T> fmt::Debug for AlpmList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlpmList")
            .field("empty", &self.is_empty())
            .field("owned", &self.raw.owned)
            .finish()
    }
}

/// Iterator over an [`AlpmList`]
pub struct Iter<'a, T> {
    nodes: Nodes<'a>,
    list: &'a AlpmList<T>,
    done: bool,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        if self.done {
            return None;
        }
        if let Err(e) = self.list.binding.check() {
            self.done = true;
            return Some(Err(e));
        }
        match self.nodes.next() {
            Some(data) => Some(Ok((self.list.wrap)(data, &self.list.binding))),
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl<T> FusedIterator for Iter<'_, T> {}
