//! CLI header (`IMAGE_COR20_HEADER`).
//!
//! The CLR runtime header data directory of a PE image points here. It locates the metadata
//! root, the managed resources, the strong name signature and the VTable fixup directory.
//!
//! # Reference
//! - [ECMA-335 II.25.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::{file::reader::BinaryReader, metadata::token::Token, Result};

bitflags! {
    /// Runtime flags of the CLI header
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct CorFlags: u32 {
        /// Image contains only IL
        const IL_ONLY = 0x0000_0001;
        /// Image can only be loaded into a 32-bit process
        const REQUIRE_32BIT = 0x0000_0002;
        /// Image is an IL library
        const IL_LIBRARY = 0x0000_0004;
        /// Image is strong name signed
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// Entry point is a native RVA rather than a token
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// Debug data is tracked
        const TRACK_DEBUG_DATA = 0x0001_0000;
        /// Image prefers to run as a 32-bit process
        const PREFER_32BIT = 0x0002_0000;
    }
}

/// The CLI header of an image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cor20Header {
    /// Size of the header, always 72
    pub cb: u32,
    /// Major version of the runtime required
    pub major_runtime_version: u16,
    /// Minor version of the runtime required
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// Raw runtime flags, see [`CorFlags`]
    pub flags: u32,
    /// Entry point token, or an RVA with [`CorFlags::NATIVE_ENTRYPOINT`]
    pub entry_point_token: u32,
    /// RVA of the managed resources
    pub resource_rva: u32,
    /// Size of the managed resources
    pub resource_size: u32,
    /// RVA of the strong name signature
    pub strong_name_signature_rva: u32,
    /// Size of the strong name signature
    pub strong_name_signature_size: u32,
    /// Reserved, always 0
    pub code_manager_table_rva: u32,
    /// Reserved, always 0
    pub code_manager_table_size: u32,
    /// RVA of the VTable fixup directory
    pub vtable_fixups_rva: u32,
    /// Size of the VTable fixup directory
    pub vtable_fixups_size: u32,
    /// Reserved, always 0
    pub export_address_table_jmp_rva: u32,
    /// Reserved, always 0
    pub export_address_table_jmp_size: u32,
    /// Reserved for precompiled images
    pub managed_native_header_rva: u32,
    /// Reserved for precompiled images
    pub managed_native_header_size: u32,
}

impl Cor20Header {
    /// Size of the header in bytes
    pub const SIZE: usize = 72;

    /// Read and validate a CLI header at the position of `reader`
    ///
    /// # Arguments
    /// * 'reader' - Positioned at the header
    ///
    /// # Errors
    /// Returns an error if the header is truncated or fails validation
    pub fn read(reader: &mut BinaryReader) -> Result<Cor20Header> {
        const VALID_FLAGS: u32 = 0x0003_001F;

        if !reader.can_read(Self::SIZE) {
            return Err(out_of_bounds_error!());
        }

        let cb = reader.read_le::<u32>()?;
        if cb as usize != Self::SIZE {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = reader.read_le::<u16>()?;
        let minor_runtime_version = reader.read_le::<u16>()?;
        if major_runtime_version == 0 || major_runtime_version > 10 {
            return Err(malformed_error!(
                "Invalid major runtime version: {}",
                major_runtime_version
            ));
        }

        let meta_data_rva = reader.read_le::<u32>()?;
        if meta_data_rva == 0 {
            return Err(malformed_error!("Metadata RVA cannot be zero"));
        }

        let meta_data_size = reader.read_le::<u32>()?;
        if meta_data_size == 0 {
            return Err(malformed_error!("Metadata size cannot be zero"));
        } else if meta_data_size > 0x1000_0000 {
            return Err(malformed_error!(
                "Metadata size {} exceeds reasonable limit (256MB)",
                meta_data_size
            ));
        }

        let flags = reader.read_le::<u32>()?;
        if flags & !VALID_FLAGS != 0 {
            return Err(malformed_error!(
                "Invalid CLR flags: 0x{:08X} contains undefined bits",
                flags
            ));
        }

        let entry_point_token = reader.read_le::<u32>()?;

        let resource_rva = reader.read_le::<u32>()?;
        let resource_size = reader.read_le::<u32>()?;
        if (resource_rva == 0) != (resource_size == 0) {
            return Err(malformed_error!("Resource values are invalid"));
        }

        let strong_name_signature_rva = reader.read_le::<u32>()?;
        let strong_name_signature_size = reader.read_le::<u32>()?;
        if (strong_name_signature_rva == 0) != (strong_name_signature_size == 0) {
            return Err(malformed_error!("Strong name values are invalid"));
        }

        let code_manager_table_rva = reader.read_le::<u32>()?;
        let code_manager_table_size = reader.read_le::<u32>()?;
        if code_manager_table_rva != 0 || code_manager_table_size != 0 {
            return Err(malformed_error!(
                "Code Manager Table fields must be zero (reserved)"
            ));
        }

        let vtable_fixups_rva = reader.read_le::<u32>()?;
        let vtable_fixups_size = reader.read_le::<u32>()?;
        if (vtable_fixups_rva == 0) != (vtable_fixups_size == 0) {
            return Err(malformed_error!("VTable fixups are invalid"));
        }

        let export_address_table_jmp_rva = reader.read_le::<u32>()?;
        let export_address_table_jmp_size = reader.read_le::<u32>()?;
        if export_address_table_jmp_rva != 0 || export_address_table_jmp_size != 0 {
            return Err(malformed_error!(
                "Export Address Table Jump fields must be zero (reserved)"
            ));
        }

        let managed_native_header_rva = reader.read_le::<u32>()?;
        let managed_native_header_size = reader.read_le::<u32>()?;

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            resource_rva,
            resource_size,
            strong_name_signature_rva,
            strong_name_signature_size,
            code_manager_table_rva,
            code_manager_table_size,
            vtable_fixups_rva,
            vtable_fixups_size,
            export_address_table_jmp_rva,
            export_address_table_jmp_size,
            managed_native_header_rva,
            managed_native_header_size,
        })
    }

    /// The runtime flags, unknown bits dropped
    #[must_use]
    pub fn cor_flags(&self) -> CorFlags {
        CorFlags::from_bits_truncate(self.flags)
    }

    /// The managed entry point, `None` for libraries and native entry points
    #[must_use]
    pub fn entry_point(&self) -> Option<Token> {
        if self.cor_flags().contains(CorFlags::NATIVE_ENTRYPOINT) {
            return None;
        }

        let token = Token::new(self.entry_point_token);
        if token.is_null() {
            None
        } else {
            Some(token)
        }
    }
}
