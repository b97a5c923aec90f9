//! OS/ABI registry.
//!
//! A fixed table of the `EI_OSABI` identifiers FatELF knows about, with the
//! name accepted by `--osabi` and the `uname(2)` sysname of the host that
//! runs binaries for that ABI.

/// `EI_OSABI` value meaning "no extensions or unspecified".
pub const OSABI_UNSPECIFIED: u8 = 0;

/// One entry of the OS/ABI registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsAbiInfo {
    /// Value stored in `e_ident[EI_OSABI]`
    pub id: u8,
    /// Canonical short name, as accepted on the command line
    pub name: &'static str,
    /// Human description
    pub description: &'static str,
    /// `uname -s` of a host running this ABI, if one is known
    pub uname: Option<&'static str>,
}

const fn abi(
    id: u8,
    name: &'static str,
    description: &'static str,
    uname: Option<&'static str>,
) -> OsAbiInfo {
    OsAbiInfo {
        id,
        name,
        description,
        uname,
    }
}

static OSABIS: &[OsAbiInfo] = &[
    abi(0, "sysv", "UNIX System V", None),
    abi(1, "hpux", "HP-UX", Some("HP-UX")),
    abi(2, "netbsd", "NetBSD", Some("NetBSD")),
    abi(3, "linux", "Linux", Some("Linux")),
    abi(4, "hurd", "GNU Hurd", Some("GNU")),
    abi(5, "86open", "86Open common IA32 ABI", None),
    abi(6, "solaris", "Solaris", Some("SunOS")),
    abi(7, "aix", "AIX", Some("AIX")),
    abi(8, "irix", "IRIX", Some("IRIX")),
    abi(9, "freebsd", "FreeBSD", Some("FreeBSD")),
    abi(10, "tru64", "TRU64 UNIX", Some("OSF1")),
    abi(11, "modesto", "Novell Modesto", None),
    abi(12, "openbsd", "OpenBSD", Some("OpenBSD")),
    abi(13, "openvms", "OpenVMS", None),
    abi(14, "nsk", "Hewlett-Packard Non-Stop Kernel", None),
    abi(15, "aros", "Amiga Research OS", Some("AROS")),
    abi(16, "fenixos", "FenixOS", None),
    abi(17, "cloudabi", "Nuxi CloudABI", None),
    abi(18, "openvos", "Stratus Technologies OpenVOS", None),
    abi(97, "armabi", "ARM ABI", None),
    abi(255, "standalone", "Standalone (embedded) application", None),
];

/// The whole registry, in id order.
pub fn all() -> &'static [OsAbiInfo] {
    OSABIS
}

/// Look up an entry by its `EI_OSABI` value.
pub fn lookup_by_id(id: u8) -> Option<&'static OsAbiInfo> {
    OSABIS.iter().find(|info| info.id == id)
}

/// Look up an entry by canonical name (exact, case-sensitive).
pub fn lookup_by_name(name: &str) -> Option<&'static OsAbiInfo> {
    OSABIS.iter().find(|info| info.name == name)
}

/// Map a host's `uname -s` to the ABI its native binaries use.
pub fn lookup_by_uname(sysname: &str) -> Option<&'static OsAbiInfo> {
    OSABIS.iter().find(|info| info.uname == Some(sysname))
}

/// Short name for an id, falling back to `osabi<N>` for ids outside the table.
pub fn display_name(id: u8) -> String {
    match lookup_by_id(id) {
        Some(info) => info.name.to_string(),
        None => format!("osabi{id}"),
    }
}
