use std::cmp::Ordering;
use std::env;

// Instruction-set extensions that gate compiled-in kernel variants
#[derive(PartialEq, Eq, Debug)]
struct IsaExtension {
    name: &'static str,
    rustc_flag: &'static str,
    cfg_flag: &'static str,
    detected: bool,
}

impl IsaExtension {
    // Define priority order between extensions (lowest number == highest priority)
    fn priority(&self) -> usize {
        match self.name {
            "avx2" => 0,
            "sse4_1" => 1,
            "neon" => 2,
            _ => usize::MAX, // lowest priority by default
        }
    }

    // Groups all extensions this crate ships specialized kernels for
    fn all() -> Vec<IsaExtension> {
        vec![
            IsaExtension {
                name: "sse4_1",
                rustc_flag: "+sse4.1",
                cfg_flag: "sse",
                detected: false,
            },
            IsaExtension {
                name: "avx2",
                rustc_flag: "+avx2,+avx",
                cfg_flag: "avx2",
                detected: false,
            },
            IsaExtension {
                name: "neon",
                rustc_flag: "+neon",
                cfg_flag: "neon",
                detected: false,
            },
        ]
    }
}

impl Ord for IsaExtension {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority().cmp(&other.priority())
    }
}

impl PartialOrd for IsaExtension {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Detection is modular per platform so new hosts only need a new detector
trait IsaDetector {
    fn detect(&self, extensions: &mut [IsaExtension]);
    fn is_applicable(&self) -> bool;
}

// Linux reads /proc/cpuinfo; `Features:`/`flags:` lines name the extensions
struct LinuxDetector;
impl IsaDetector for LinuxDetector {
    fn detect(&self, extensions: &mut [IsaExtension]) {
        if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
            let contents = cpuinfo.to_lowercase();
            for extension in extensions.iter_mut() {
                extension.detected = contents.contains(extension.name);
            }
        }
    }

    fn is_applicable(&self) -> bool {
        cfg!(target_os = "linux")
    }
}

// macOS exposes the same information through sysctl
struct MacOSDetector;
impl IsaDetector for MacOSDetector {
    fn detect(&self, extensions: &mut [IsaExtension]) {
        let output = std::process::Command::new("sysctl").args(["-a"]).output();

        if let Ok(output) = output {
            let contents = String::from_utf8_lossy(&output.stdout).to_lowercase();

            for extension in extensions.iter_mut() {
                match extension.name {
                    "avx2" => extension.detected = contents.contains("hw.optional.avx2_0: 1"),
                    "sse4_1" => extension.detected = contents.contains("hw.optional.sse4_1: 1"),
                    "neon" => extension.detected = contents.contains("hw.optional.neon: 1"),
                    _ => {}
                }
            }
        }
    }

    fn is_applicable(&self) -> bool {
        cfg!(target_os = "macos")
    }
}

struct PlatformDetector;
impl PlatformDetector {
    fn detectors() -> Vec<Box<dyn IsaDetector>> {
        vec![Box::new(LinuxDetector), Box::new(MacOSDetector)]
    }

    fn detect(extensions: &mut [IsaExtension]) {
        for detector in Self::detectors() {
            if detector.is_applicable() {
                detector.detect(extensions);
                break;
            }
        }
    }

    fn apply(extensions: &mut [IsaExtension]) {
        // Sort extensions by priority (highest first)
        extensions.sort();

        // Use the highest detected extension, or the portable path when none is
        let cfg_flag = extensions
            .iter()
            .find(|extension| extension.detected)
            .map(|extension| {
                println!("cargo:rustc-flag=-C");
                println!("cargo:rustc-flag=target-feature={}", extension.rustc_flag);
                extension.cfg_flag
            })
            .unwrap_or("fallback");

        println!("cargo:rustc-cfg={cfg_flag}");

        println!("cargo::rustc-check-cfg=cfg(avx2)");
        println!("cargo::rustc-check-cfg=cfg(sse)");
        println!("cargo::rustc-check-cfg=cfg(neon)");
        println!("cargo::rustc-check-cfg=cfg(fallback)");
    }
}

fn main() {
    let mut extensions = IsaExtension::all();

    // Feature probing is only meaningful when host == target; cross builds
    // take the portable path
    let host = env::var("HOST").unwrap_or_default();
    let target = env::var("TARGET").unwrap_or_default();

    if host == target {
        PlatformDetector::detect(&mut extensions);
    }

    PlatformDetector::apply(&mut extensions);
}
