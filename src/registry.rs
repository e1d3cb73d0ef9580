use std::collections::{HashMap, HashSet};

use crate::error::Error;
use crate::naming::{method_call_name, root_function_name, wrapped_call_name, wrapper_name};
use crate::resolve::{FileDescriptor, ServiceDescriptor};

/// Name lookups for one proto file, built once and read-only during the walk.
#[derive(Debug, Clone)]
pub struct Registry {
    /// `Register<Service>HandlerServer` -> service.
    roots: HashMap<String, ServiceDescriptor>,
    /// `local_request_<Service>_<Method>_0`, one per method across services.
    expected_calls: HashSet<String>,
}

impl Registry {
    /// Index the services of `file`. A descriptor without services has
    /// nothing to rewrite and is rejected so the caller can skip it.
    pub fn build(file: &FileDescriptor) -> Result<Self, Error> {
        if file.services.is_empty() {
            return Err(Error::NoServices {
                file: file.filename.clone(),
            });
        }

        let mut roots = HashMap::with_capacity(file.services.len());
        let mut expected_calls = HashSet::with_capacity(file.method_count());
        for service in &file.services {
            for method in &service.methods {
                expected_calls.insert(method_call_name(&service.name, &method.name));
            }
            roots.insert(root_function_name(&service.name), service.clone());
        }

        Ok(Self {
            roots,
            expected_calls,
        })
    }

    pub fn root_service(&self, function: &str) -> Option<&ServiceDescriptor> {
        self.roots.get(function)
    }

    pub fn is_expected_call(&self, function: &str) -> bool {
        self.expected_calls.contains(function)
    }

    /// Whether `function` is a wrapper this crate generates for this file.
    pub fn is_wrapper_name(&self, function: &str) -> bool {
        wrapped_call_name(function).is_some_and(|call| self.is_expected_call(call))
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    pub fn expected_call_count(&self) -> usize {
        self.expected_calls.len()
    }

    /// Every wrapper name this file can produce, sorted.
    pub fn wrapper_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.expected_calls.iter().map(|c| wrapper_name(c)).collect();
        names.sort_unstable();
        names
    }
}
