mod test_nurbs_basic;
mod test_offset_basic;
