// Read-only view of the simulator's named file mapping.

use std::ffi::{c_void, OsStr};
use std::mem;
use std::os::windows::ffi::OsStrExt;

use windows::Win32::Foundation::{CloseHandle, HANDLE, PWSTR};
use windows::Win32::System::Memory::{
    MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, VirtualQuery, FILE_MAP_READ,
    MEMORY_BASIC_INFORMATION,
};

use telemetry_core::irsdk::copy_image;
use telemetry_core::source::SourceError;

pub struct Mapping {
    handle: HANDLE,
    view: *const u8,
    len: usize,
}

impl Mapping {
    pub fn open(name: &str) -> Result<Self, SourceError> {
        let mut wide: Vec<u16> = OsStr::new(name).encode_wide().chain(Some(0)).collect();
        let handle = unsafe { OpenFileMappingW(FILE_MAP_READ.0, false, PWSTR(wide.as_mut_ptr())) };
        if handle.is_invalid() {
            return Err(SourceError::NotRunning);
        }
        let view = unsafe { MapViewOfFile(handle, FILE_MAP_READ, 0, 0, 0) };
        if view.is_null() {
            unsafe {
                CloseHandle(handle);
            }
            return Err(SourceError::NotRunning);
        }
        let mut info = MEMORY_BASIC_INFORMATION::default();
        let queried = unsafe {
            VirtualQuery(view, &mut info, mem::size_of::<MEMORY_BASIC_INFORMATION>())
        };
        // unmapped and closed by Drop if the query fails
        let mapping = Self {
            handle,
            view: view as *const u8,
            len: info.RegionSize,
        };
        if queried == 0 {
            return Err(SourceError::NotRunning);
        }
        Ok(mapping)
    }

    /// Copies the header, variable headers and data buffers into `buffer`.
    /// Returns false when the header describes more than the mapped view.
    pub fn copy_into(&self, buffer: &mut Vec<u8>) -> bool {
        let view = unsafe { std::slice::from_raw_parts(self.view, self.len) };
        copy_image(view, buffer)
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            UnmapViewOfFile(self.view as *const c_void);
            CloseHandle(self.handle);
        }
    }
}
