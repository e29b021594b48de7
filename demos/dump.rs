use memmap2::Mmap;

use heif::marshal::{iso::File, Decode};

fn main() {
    env_logger::init();

    let path = std::env::args().nth(1).expect("usage: dump <file>");
    let mmap = unsafe { Mmap::map(&std::fs::File::open(path).unwrap()) }.unwrap();
    let file = File::decode(&mut mmap.as_ref()).unwrap();
    println!("{file:#?}");
}
