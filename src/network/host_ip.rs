// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Discovery of the host's non-loopback address, used to advertise a server
//! that listens on a wildcard address.

use std::net::IpAddr;

use crate::{AppError, AppResult};

/// Returns the first non-loopback IP of an up interface.
///
/// `None` checks all interfaces. Loopback interfaces are always skipped.
///
/// # Errors
///
/// [`AppError::NetworkInterfaceNotFound`] if the named interface does not
/// exist, [`AppError::NoAvailableIpAddress`] if no interface has a usable
/// address.
pub fn resolve_host_ip(interface: Option<&str>) -> AppResult<IpAddr> {
    let mut interface_found = false;
    for entry in sys::interfaces()? {
        if interface.is_some_and(|name| name != entry.name) {
            continue;
        }
        interface_found = true;
        if !entry.up || entry.loopback {
            continue;
        }
        match entry.addr {
            Some(ip) if !ip.is_loopback() => return Ok(ip),
            _ => continue,
        }
    }

    if !interface_found {
        return Err(AppError::NetworkInterfaceNotFound);
    }
    Err(AppError::NoAvailableIpAddress)
}

#[derive(Debug)]
struct InterfaceAddr {
    name: String,
    up: bool,
    loopback: bool,
    addr: Option<IpAddr>,
}

#[cfg(unix)]
mod sys {
    use std::ffi::CStr;
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use std::ptr;

    use super::InterfaceAddr;
    use crate::AppResult;

    pub(super) fn interfaces() -> AppResult<Vec<InterfaceAddr>> {
        let mut head: *mut libc::ifaddrs = ptr::null_mut();
        if unsafe { libc::getifaddrs(&mut head) } == -1 {
            return Err(io::Error::last_os_error().into());
        }

        let mut entries = Vec::new();
        let mut cursor = head;
        while !cursor.is_null() {
            // SAFETY: cursor walks the list returned by getifaddrs, freed below
            let ifa = unsafe { &*cursor };
            cursor = ifa.ifa_next;
            if ifa.ifa_name.is_null() {
                continue;
            }
            let name = unsafe { CStr::from_ptr(ifa.ifa_name) }
                .to_string_lossy()
                .into_owned();
            let flags = ifa.ifa_flags as libc::c_int;
            entries.push(InterfaceAddr {
                name,
                up: flags & libc::IFF_UP != 0,
                loopback: flags & libc::IFF_LOOPBACK != 0,
                addr: unsafe { sockaddr_ip(ifa.ifa_addr) },
            });
        }

        unsafe { libc::freeifaddrs(head) };
        Ok(entries)
    }

    unsafe fn sockaddr_ip(addr: *const libc::sockaddr) -> Option<IpAddr> {
        if addr.is_null() {
            return None;
        }
        match (*addr).sa_family as libc::c_int {
            libc::AF_INET => {
                let sin = &*(addr as *const libc::sockaddr_in);
                Some(IpAddr::V4(Ipv4Addr::from(u32::from_be(
                    sin.sin_addr.s_addr,
                ))))
            }
            libc::AF_INET6 => {
                let sin6 = &*(addr as *const libc::sockaddr_in6);
                Some(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)))
            }
            // link layer entries and the like
            _ => None,
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use super::InterfaceAddr;
    use crate::{AppError, AppResult};

    pub(super) fn interfaces() -> AppResult<Vec<InterfaceAddr>> {
        Err(AppError::IllegalStateError(
            "interface enumeration is only supported on unix".to_string(),
        ))
    }
}
